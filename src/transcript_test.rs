use super::*;

fn msg(agent: &str, content: &str, tokens: u64) -> StreamEvent {
    StreamEvent::Message {
        agent_code: agent.to_owned(),
        content: content.to_owned(),
        tokens,
        created_date: None,
    }
}

fn msg_at(agent: &str, content: &str, tokens: u64, date: &str) -> StreamEvent {
    StreamEvent::Message {
        agent_code: agent.to_owned(),
        content: content.to_owned(),
        tokens,
        created_date: Some(date.to_owned()),
    }
}

fn history_row(id: &str, role: Role, content: &str, order: u64) -> ThreadMessage {
    ThreadMessage {
        message_id: id.to_owned(),
        thread_id: "t-1".to_owned(),
        agent_id: None,
        agent_name: None,
        role,
        content: content.to_owned(),
        input_tokens: 0,
        output_tokens: 0,
        total_tokens: 0,
        message_order: order,
        is_edited: false,
        edited_date: None,
        created_date: None,
        modified_date: None,
    }
}

// =============================================================================
// submit
// =============================================================================

#[test]
fn submit_appends_optimistic_user_message() {
    let mut t = Transcript::new();
    t.load_history(Some("t-1".into()), vec![history_row("m1", Role::User, "earlier", 1)]);

    let ticket = t.submit("  hello  ");
    assert!(ticket.is_some());
    assert!(t.is_streaming());
    assert_eq!(t.messages().len(), 2);

    let user = &t.messages()[1];
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "hello");
    assert_eq!(user.thread_id, "t-1");
    assert_eq!(user.message_order, 2);
    assert!(user.message_id.starts_with("local-"));
    assert!(user.created_date.is_some());
}

#[test]
fn submit_while_streaming_is_a_noop() {
    let mut t = Transcript::new();
    let _ticket = t.submit("first").unwrap();
    let before = t.messages().to_vec();

    assert!(t.submit("second").is_none());
    assert_eq!(t.messages(), before.as_slice());
}

#[test]
fn submit_blank_text_is_a_noop() {
    let mut t = Transcript::new();
    assert!(t.submit("   \n").is_none());
    assert!(t.messages().is_empty());
    assert!(!t.is_streaming());
}

#[test]
fn local_ids_are_unique() {
    let mut t = Transcript::new();
    let ticket = t.submit("a").unwrap();
    t.apply(ticket, StreamEvent::StreamEnd);
    let ticket = t.submit("b").unwrap();
    t.apply(ticket, StreamEvent::StreamEnd);
    assert_ne!(t.messages()[0].message_id, t.messages()[1].message_id);
}

// =============================================================================
// Fragment folding
// =============================================================================

#[test]
fn same_agent_deltas_concatenate_in_arrival_order() {
    let mut t = Transcript::new();
    let ticket = t.submit("q").unwrap();
    let parts = ["The", " quick", " brown", "", " fox"];
    for (i, part) in parts.iter().enumerate() {
        t.apply(ticket, msg("freddy", part, i as u64 + 1));
    }
    assert_eq!(t.messages().len(), 1);
    assert_eq!(t.fragment().unwrap().content, "The quick brown fox");

    assert_eq!(t.apply(ticket, StreamEvent::StreamEnd), Applied::Ended { finalized: true });
    let reply = t.messages().last().unwrap();
    assert_eq!(reply.content, parts.concat());
    assert!(t.fragment().is_none());
}

#[test]
fn simple_turn_scenario() {
    let mut t = Transcript::new();
    let ticket = t.submit("hello").unwrap();
    assert_eq!(t.messages()[0].role, Role::User);
    assert_eq!(t.messages()[0].content, "hello");

    assert_eq!(t.apply(ticket, msg("freddy", "Hi", 1)), Applied::Started);
    assert_eq!(t.apply(ticket, msg("freddy", " there", 2)), Applied::Extended);
    assert_eq!(t.apply(ticket, StreamEvent::StreamEnd), Applied::Ended { finalized: true });

    assert_eq!(t.messages().len(), 2);
    let reply = &t.messages()[1];
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.agent_name.as_deref(), Some("freddy"));
    assert_eq!(reply.total_tokens, 2);
    assert_eq!(reply.output_tokens, 2);
    assert_eq!(reply.input_tokens, 0);
    assert_eq!(reply.message_order, 0);
    assert!(!t.is_streaming());
}

#[test]
fn hand_off_finalizes_previous_agent() {
    let mut t = Transcript::new();
    let ticket = t.submit("go").unwrap();

    t.apply(ticket, msg("A", "part1", 4));
    assert_eq!(t.apply(ticket, msg("B", "part2", 7)), Applied::HandedOff);
    assert_eq!(t.messages().len(), 2);
    assert_eq!(t.fragment().unwrap().agent_code, "B");

    t.apply(ticket, StreamEvent::StreamEnd);
    let replies: Vec<_> = t.messages()[1..]
        .iter()
        .map(|m| (m.agent_name.as_deref().unwrap(), m.content.as_str(), m.total_tokens))
        .collect();
    assert_eq!(replies, vec![("A", "part1", 4), ("B", "part2", 7)]);
    assert!(t.fragment().is_none());
}

#[test]
fn hand_off_back_to_first_agent_starts_a_new_message() {
    let mut t = Transcript::new();
    let ticket = t.submit("go").unwrap();
    t.apply(ticket, msg("A", "one", 1));
    t.apply(ticket, msg("B", "two", 1));
    t.apply(ticket, msg("A", "three", 1));
    t.apply(ticket, StreamEvent::StreamEnd);

    let contents: Vec<_> = t.messages()[1..].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
}

#[test]
fn stream_end_without_fragment_is_a_noop() {
    let mut t = Transcript::new();
    let ticket = t.submit("q").unwrap();
    let before = t.messages().to_vec();

    assert_eq!(t.apply(ticket, StreamEvent::StreamEnd), Applied::Ended { finalized: false });
    assert_eq!(t.messages(), before.as_slice());
    assert!(!t.is_streaming());
}

#[test]
fn fragment_keeps_event_created_date() {
    let mut t = Transcript::new();
    let ticket = t.submit("q").unwrap();
    t.apply(ticket, msg_at("A", "x", 1, "2025-03-01T10:00:00+00:00"));
    t.apply(ticket, msg("A", "y", 2));
    assert_eq!(t.fragment().unwrap().created_date, "2025-03-01T10:00:00+00:00");

    t.apply(ticket, StreamEvent::StreamEnd);
    assert_eq!(t.messages()[1].created_date.as_deref(), Some("2025-03-01T10:00:00+00:00"));
}

#[test]
fn unknown_events_are_ignored() {
    let mut t = Transcript::new();
    let ticket = t.submit("q").unwrap();
    assert_eq!(t.apply(ticket, StreamEvent::Unknown), Applied::Ignored);
    assert!(t.is_streaming());
    assert!(t.fragment().is_none());
}

#[test]
fn finish_finalizes_when_stream_end_never_arrived() {
    let mut t = Transcript::new();
    let ticket = t.submit("q").unwrap();
    t.apply(ticket, msg("A", "partial", 1));
    assert_eq!(t.finish(ticket), Applied::Ended { finalized: true });
    assert_eq!(t.messages()[1].content, "partial");
    assert!(!t.is_streaming());
}

// =============================================================================
// Failure and stale turns
// =============================================================================

#[test]
fn failure_keeps_user_message_and_drops_fragment() {
    let mut t = Transcript::new();
    let ticket = t.submit("hello").unwrap();
    t.apply(ticket, msg("A", "half", 1));

    assert!(t.fail(ticket, "connection reset"));
    assert_eq!(t.messages().len(), 1);
    assert_eq!(t.messages()[0].content, "hello");
    assert!(t.fragment().is_none());
    assert_eq!(t.error(), Some("connection reset"));
    assert_eq!(t.state(), &TurnState::Failed("connection reset".into()));
}

#[test]
fn failure_after_hand_off_keeps_finalized_messages() {
    let mut t = Transcript::new();
    let ticket = t.submit("hello").unwrap();
    t.apply(ticket, msg("A", "done part", 1));
    t.apply(ticket, msg("B", "lost part", 1));
    t.fail(ticket, "boom");

    let contents: Vec<_> = t.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "done part"]);
}

#[test]
fn resubmit_after_failure_starts_new_turn() {
    let mut t = Transcript::new();
    let ticket = t.submit("hello").unwrap();
    t.fail(ticket, "boom");

    let retry = t.submit("hello").unwrap();
    assert_ne!(retry, ticket);
    assert!(t.error().is_none());
    assert_eq!(t.apply(ticket, msg("A", "late", 1)), Applied::Stale);
    assert_eq!(t.apply(retry, msg("A", "ok", 1)), Applied::Started);
}

#[test]
fn thread_switch_discards_fragment_and_stale_events() {
    let mut t = Transcript::new();
    let ticket = t.submit("hello").unwrap();
    t.apply(ticket, msg("A", "streaming", 1));

    t.load_history(Some("t-2".into()), vec![history_row("x1", Role::User, "other thread", 1)]);
    assert!(t.fragment().is_none());
    assert!(!t.is_streaming());
    assert_eq!(t.thread_id(), Some("t-2"));

    assert_eq!(t.apply(ticket, msg("A", " more", 2)), Applied::Stale);
    assert_eq!(t.apply(ticket, StreamEvent::StreamEnd), Applied::Stale);
    assert!(!t.fail(ticket, "late failure"));
    assert_eq!(t.messages().len(), 1);
    assert_eq!(t.messages()[0].content, "other thread");
}

#[test]
fn stale_ticket_does_not_touch_a_new_turn_in_new_thread() {
    let mut t = Transcript::new();
    let old = t.submit("a").unwrap();
    t.load_history(Some("t-2".into()), Vec::new());
    let new = t.submit("b").unwrap();

    assert_eq!(t.apply(old, msg("A", "leak", 1)), Applied::Stale);
    assert!(t.fragment().is_none());
    t.apply(new, msg("A", "fresh", 1));
    t.apply(new, StreamEvent::StreamEnd);
    assert_eq!(t.messages().last().unwrap().content, "fresh");
    assert_eq!(t.messages().last().unwrap().thread_id, "t-2");
}

#[test]
fn clear_empties_everything() {
    let mut t = Transcript::new();
    t.load_history(Some("t-1".into()), vec![history_row("m1", Role::User, "x", 1)]);
    t.clear();
    assert!(t.messages().is_empty());
    assert!(t.thread_id().is_none());
}
