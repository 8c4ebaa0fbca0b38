use super::*;
use time::macros::datetime;

fn parse_list(json: serde_json::Value) -> Vec<ChatThread> {
    let raw: Vec<RawThread> = serde_json::from_value(json).unwrap();
    raw.into_iter().map(ChatThread::from).collect()
}

fn thread(id: &str, last_activity: Option<&str>) -> ChatThread {
    ChatThread {
        thread_id: id.to_owned(),
        title: id.to_owned(),
        icon: DEFAULT_THREAD_ICON.to_owned(),
        created_date: None,
        last_activity_date: last_activity.map(str::to_owned),
        message_count: 0,
    }
}

// =============================================================================
// Normalization
// =============================================================================

#[test]
fn prefers_thread_prefixed_fields() {
    let threads = parse_list(serde_json::json!([{
        "thread_id": "t1",
        "thread_title": "Campaign brief",
        "title": "ignored",
        "thread_icon": "FileText",
        "icon": "Folder",
        "total_messages": 7,
        "message_count": 2,
        "created_date": "2025-03-01T10:00:00",
        "last_activity_date": "2025-03-02T10:00:00"
    }]));
    assert_eq!(threads[0].title, "Campaign brief");
    assert_eq!(threads[0].icon, "FileText");
    assert_eq!(threads[0].message_count, 7);
    assert_eq!(threads[0].last_activity_date.as_deref(), Some("2025-03-02T10:00:00"));
}

#[test]
fn falls_back_to_plain_fields() {
    let threads = parse_list(serde_json::json!([{
        "thread_id": "t2",
        "title": "Plain",
        "icon": "Target",
        "message_count": 3
    }]));
    assert_eq!(threads[0].title, "Plain");
    assert_eq!(threads[0].icon, "Target");
    assert_eq!(threads[0].message_count, 3);
}

#[test]
fn falls_back_to_defaults() {
    let threads = parse_list(serde_json::json!([{ "thread_id": "t3", "thread_title": "" }]));
    assert_eq!(threads[0].title, DEFAULT_THREAD_TITLE);
    assert_eq!(threads[0].icon, DEFAULT_THREAD_ICON);
    assert_eq!(threads[0].message_count, 0);
}

#[test]
fn zero_total_messages_is_not_replaced_by_message_count() {
    let threads = parse_list(serde_json::json!([
        { "thread_id": "t4", "total_messages": 0, "message_count": 9 }
    ]));
    assert_eq!(threads[0].message_count, 0);
}

#[test]
fn unknown_icon_tag_falls_back_to_message_square() {
    let mut t = thread("t", None);
    t.icon = "Rocket".to_owned();
    assert_eq!(t.icon_kind(), ThreadIcon::MessageSquare);
    t.icon = "BarChart".to_owned();
    assert_eq!(t.icon_kind(), ThreadIcon::BarChart);
    assert_eq!(ThreadIcon::BarChart.glyph(), "📊");
}

// =============================================================================
// Time buckets
// =============================================================================

#[test]
fn groups_threads_by_last_activity() {
    let now = datetime!(2025-03-10 15:00 UTC);
    let threads = vec![
        thread("today", Some("2025-03-10T08:00:00+00:00")),
        thread("yesterday", Some("2025-03-09T23:59:59")),
        thread("week", Some("2025-03-04T12:00:00Z")),
        thread("edge-week", Some("2025-03-03T00:00:00Z")),
        thread("old", Some("2025-02-01T00:00:00Z")),
        thread("missing", None),
        thread("garbage", Some("soon")),
    ];
    let groups = group_by_activity(&threads, now);

    let ids = |list: &[ChatThread]| list.iter().map(|t| t.thread_id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&groups.today), vec!["today"]);
    assert_eq!(ids(&groups.yesterday), vec!["yesterday"]);
    assert_eq!(ids(&groups.this_week), vec!["week", "edge-week"]);
    assert_eq!(ids(&groups.older), vec!["old", "missing", "garbage"]);
}

#[test]
fn sections_skip_empty_buckets() {
    let now = datetime!(2025-03-10 15:00 UTC);
    let groups = group_by_activity(&[thread("a", Some("2025-03-10T09:00:00Z"))], now);
    let sections = groups.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].0, "Today");
}

// =============================================================================
// ThreadList
// =============================================================================

#[test]
fn remove_current_thread_clears_selection() {
    let mut list = ThreadList::default();
    list.replace(vec![thread("a", None), thread("b", None)]);
    list.current_thread_id = Some("a".to_owned());
    assert_eq!(list.current().unwrap().thread_id, "a");

    assert!(!list.remove("b"));
    assert_eq!(list.current_thread_id.as_deref(), Some("a"));
    assert!(list.remove("a"));
    assert!(list.current_thread_id.is_none());
    assert!(list.threads.is_empty());
}

#[test]
fn replace_clears_previous_error() {
    let mut list = ThreadList::default();
    list.set_error("Failed to load threads");
    list.replace(Vec::new());
    assert!(list.error.is_none());
}
