//! Table definitions owned by each component.

use crate::config::UpgradeConfig;
use crate::core::{ColumnDef, DataType, IndexDef, TableDef};

fn id() -> ColumnDef {
    ColumnDef::new("id", DataType::BigInt).auto_increment()
}

fn big(name: &str) -> ColumnDef {
    ColumnDef::new(name, DataType::BigInt).not_null()
}

fn flag(name: &str, default: &str) -> ColumnDef {
    ColumnDef::new(name, DataType::TinyInt)
        .not_null()
        .default_value(default)
}

fn varchar(name: &str, len: u16) -> ColumnDef {
    ColumnDef::new(name, DataType::VarChar(len)).not_null()
}

fn datetime(name: &str) -> ColumnDef {
    ColumnDef::new(name, DataType::DateTime).not_null()
}

fn long_text(name: &str) -> ColumnDef {
    ColumnDef::new(name, DataType::LongText).not_null()
}

fn indexed(mut table: TableDef, columns: &[&str]) -> TableDef {
    for column in columns {
        table = table.index(IndexDef::new(*column, [*column]));
    }
    table
}

fn meta_table(name: String, object_column: &str) -> TableDef {
    let table = TableDef::new(name)
        .column(id())
        .column(big(object_column))
        .column(ColumnDef::new("meta_key", DataType::VarChar(255)))
        .column(ColumnDef::new("meta_value", DataType::LongText))
        .primary_key(["id"]);
    indexed(table, &[object_column, "meta_key"])
}

pub fn signups(config: &UpgradeConfig) -> Vec<TableDef> {
    let table = TableDef::new(config.table_name("signups"))
        .column(ColumnDef::new("signup_id", DataType::BigInt).auto_increment())
        .column(varchar("domain", 200).default_value(""))
        .column(varchar("path", 100).default_value(""))
        .column(long_text("title"))
        .column(varchar("user_login", 60).default_value(""))
        .column(varchar("user_email", 100).default_value(""))
        .column(datetime("registered").default_value("0000-00-00 00:00:00"))
        .column(datetime("activated").default_value("0000-00-00 00:00:00"))
        .column(flag("active", "0"))
        .column(varchar("activation_key", 50).default_value(""))
        .column(ColumnDef::new("meta", DataType::LongText))
        .primary_key(["signup_id"])
        .index(IndexDef::new("activation_key", ["activation_key"]))
        .index(IndexDef::new("user_email", ["user_email"]))
        .index(IndexDef::new("user_login_email", ["user_login", "user_email"]))
        .index(IndexDef::new("domain_path", ["domain", "path"]));
    vec![table]
}

pub fn notifications(config: &UpgradeConfig) -> Vec<TableDef> {
    let table = TableDef::new(config.table_name("notifications"))
        .column(id())
        .column(big("user_id"))
        .column(big("item_id"))
        .column(big("secondary_item_id"))
        .column(varchar("component_name", 75))
        .column(varchar("component_action", 75))
        .column(datetime("date_notified"))
        .column(flag("is_new", "0"))
        .primary_key(["id"])
        .index(IndexDef::new("useritem", ["user_id", "is_new"]));
    vec![indexed(
        table,
        &[
            "item_id",
            "secondary_item_id",
            "user_id",
            "is_new",
            "component_name",
            "component_action",
        ],
    )]
}

pub fn activity(config: &UpgradeConfig) -> Vec<TableDef> {
    let table = TableDef::new(config.table_name("activity"))
        .column(id())
        .column(big("user_id"))
        .column(varchar("component", 75))
        .column(varchar("type", 75))
        .column(ColumnDef::new("action", DataType::Text).not_null())
        .column(long_text("content"))
        .column(ColumnDef::new("primary_link", DataType::Text).not_null())
        .column(big("item_id"))
        .column(ColumnDef::new("secondary_item_id", DataType::BigInt))
        .column(datetime("date_recorded"))
        .column(flag("hide_sitewide", "0"))
        .column(ColumnDef::new("mptt_left", DataType::Int).not_null().default_value("0"))
        .column(ColumnDef::new("mptt_right", DataType::Int).not_null().default_value("0"))
        .column(flag("is_spam", "0"))
        .primary_key(["id"]);
    let table = indexed(
        table,
        &[
            "date_recorded",
            "user_id",
            "item_id",
            "secondary_item_id",
            "component",
            "type",
            "mptt_left",
            "mptt_right",
            "hide_sitewide",
            "is_spam",
        ],
    );
    vec![table, meta_table(config.table_name("activity_meta"), "activity_id")]
}

pub fn friends(config: &UpgradeConfig) -> Vec<TableDef> {
    let table = TableDef::new(config.table_name("friends"))
        .column(id())
        .column(big("initiator_user_id"))
        .column(big("friend_user_id"))
        .column(flag("is_confirmed", "0"))
        .column(flag("is_limited", "0"))
        .column(datetime("date_created"))
        .primary_key(["id"]);
    vec![indexed(table, &["initiator_user_id", "friend_user_id"])]
}

pub fn groups(config: &UpgradeConfig) -> Vec<TableDef> {
    let groups = TableDef::new(config.table_name("groups"))
        .column(id())
        .column(big("creator_id"))
        .column(varchar("name", 100))
        .column(varchar("slug", 200))
        .column(long_text("description"))
        .column(varchar("status", 10).default_value("public"))
        .column(flag("enable_forum", "1"))
        .column(datetime("date_created"))
        .primary_key(["id"]);

    let members = TableDef::new(config.table_name("groups_members"))
        .column(id())
        .column(big("group_id"))
        .column(big("user_id"))
        .column(big("inviter_id"))
        .column(flag("is_admin", "0"))
        .column(flag("is_mod", "0"))
        .column(varchar("user_title", 100))
        .column(datetime("date_modified"))
        .column(long_text("comments"))
        .column(flag("is_confirmed", "0"))
        .column(flag("is_banned", "0"))
        .column(flag("invite_sent", "0"))
        .primary_key(["id"]);

    vec![
        indexed(groups, &["creator_id", "status"]),
        indexed(
            members,
            &["group_id", "is_admin", "is_mod", "user_id", "inviter_id", "is_confirmed"],
        ),
        meta_table(config.table_name("groups_groupmeta"), "group_id"),
    ]
}

pub fn messages(config: &UpgradeConfig) -> Vec<TableDef> {
    let messages = TableDef::new(config.table_name("messages_messages"))
        .column(id())
        .column(big("thread_id"))
        .column(big("sender_id"))
        .column(varchar("subject", 200))
        .column(long_text("message"))
        .column(datetime("date_sent"))
        .primary_key(["id"]);

    let recipients = TableDef::new(config.table_name("messages_recipients"))
        .column(id())
        .column(big("user_id"))
        .column(big("thread_id"))
        .column(ColumnDef::new("unread_count", DataType::Int).not_null().default_value("0"))
        .column(flag("sender_only", "0"))
        .column(flag("is_deleted", "0"))
        .primary_key(["id"]);

    let notices = TableDef::new(config.table_name("messages_notices"))
        .column(id())
        .column(varchar("subject", 200))
        .column(long_text("message"))
        .column(datetime("date_sent"))
        .column(flag("is_active", "0"))
        .primary_key(["id"]);

    vec![
        indexed(messages, &["sender_id", "thread_id"]),
        indexed(
            recipients,
            &["user_id", "thread_id", "is_deleted", "sender_only", "unread_count"],
        ),
        indexed(notices, &["is_active"]),
        meta_table(config.table_name("messages_meta"), "message_id"),
    ]
}

pub fn xprofile(config: &UpgradeConfig) -> Vec<TableDef> {
    let groups = TableDef::new(config.table_name("xprofile_groups"))
        .column(id())
        .column(varchar("name", 150))
        .column(ColumnDef::new("description", DataType::Text).not_null())
        .column(big("group_order").default_value("0"))
        .column(flag("can_delete", "1"))
        .primary_key(["id"]);

    let fields = TableDef::new(config.table_name("xprofile_fields"))
        .column(id())
        .column(big("group_id"))
        .column(big("parent_id"))
        .column(varchar("type", 150))
        .column(varchar("name", 150))
        .column(long_text("description"))
        .column(flag("is_required", "0"))
        .column(flag("is_default_option", "0"))
        .column(big("field_order").default_value("0"))
        .column(big("option_order").default_value("0"))
        .column(varchar("order_by", 15).default_value(""))
        .column(flag("can_delete", "1"))
        .primary_key(["id"]);

    let data = TableDef::new(config.table_name("xprofile_data"))
        .column(id())
        .column(big("field_id"))
        .column(big("user_id"))
        .column(long_text("value"))
        .column(datetime("last_updated"))
        .primary_key(["id"]);

    let meta = meta_table(config.table_name("xprofile_meta"), "object_id")
        .column(varchar("object_type", 150));

    vec![
        indexed(groups, &["can_delete"]),
        indexed(
            fields,
            &["group_id", "parent_id", "field_order", "can_delete", "is_required"],
        ),
        indexed(data, &["field_id", "user_id"]),
        meta,
    ]
}

pub fn blogs(config: &UpgradeConfig) -> Vec<TableDef> {
    let table = TableDef::new(config.table_name("user_blogs"))
        .column(id())
        .column(big("user_id"))
        .column(big("blog_id"))
        .primary_key(["id"]);
    vec![
        indexed(table, &["user_id", "blog_id"]),
        meta_table(config.table_name("user_blogs_blogmeta"), "blog_id"),
    ]
}
