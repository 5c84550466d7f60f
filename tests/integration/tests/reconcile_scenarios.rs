use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use muster_core::{
    ChatPlatform, Entity, EntityKey, EventRecord, FixedClock, InMemoryChatPlatform,
    InMemoryEntityStore, Interaction, MessageAuthor, MessagePayload, PlatformCall,
    PreparationRequest, RenderedMessage,
};
use muster_reconcile::variants::{
    weekly_schedule_header, CalendarVariant, EventInfoVariant, MessageVariant,
    PreparationStatusVariant, ViewSources, WeeklyScheduleVariant,
};
use muster_reconcile::{
    ChannelLayout, ReconcileConfig, ReconcileEngine, ReplyContinuity, SchedulerPhase,
};

const NOW: i64 = 1_792_000_000;

struct World {
    store: Arc<InMemoryEntityStore>,
    platform: Arc<InMemoryChatPlatform>,
    engine: ReconcileEngine,
}

fn config() -> ReconcileConfig {
    ReconcileConfig {
        debounce_ms: 1_000,
        channels: ChannelLayout {
            announcements: vec!["announce".to_string()],
            calendar: vec!["calendar".to_string()],
            schedule: vec!["schedule".to_string()],
            preparation: vec!["prep".to_string()],
        },
        ..ReconcileConfig::default()
    }
}

fn world() -> World {
    let store = Arc::new(InMemoryEntityStore::new());
    let platform = Arc::new(InMemoryChatPlatform::new());
    let engine = ReconcileEngine::from_parts(
        &config(),
        store.clone(),
        platform.clone(),
        Arc::new(FixedClock::new(NOW)),
    );
    World {
        store,
        platform,
        engine,
    }
}

fn event(id: i64, name: &str) -> EventRecord {
    EventRecord {
        id,
        guild_id: "900".to_string(),
        scheduled_event_id: format!("55{id}"),
        name: name.to_string(),
        description: "Bring snacks".to_string(),
        location: Some("Voice 1".to_string()),
        start_unix: NOW + 3_600,
        end_unix: None,
    }
}

fn post(
    world: &World,
    channel_id: &str,
    author: MessageAuthor,
    payload: &MessagePayload,
) -> RenderedMessage {
    world.platform.insert_message(
        RenderedMessage {
            channel_id: channel_id.to_string(),
            author,
            ..RenderedMessage::default()
        }
        .with_payload(payload),
    )
}

fn rename(world: &World, id: i64, name: &str) -> EventRecord {
    let renamed = event(id, name);
    world.store.upsert_event(renamed.clone());
    renamed
}

#[tokio::test]
async fn integration_entity_change_updates_event_info_and_calendar_views() {
    let world = world();
    let original = event(42, "Raid night");
    world.store.upsert_event(original.clone());
    let info = post(
        &world,
        "announce",
        MessageAuthor::Bot,
        &EventInfoVariant::render(&original, &[]),
    );
    let calendar = post(
        &world,
        "calendar",
        MessageAuthor::Webhook,
        &CalendarVariant::render(std::slice::from_ref(&original), 14),
    );

    let renamed = rename(&world, 42, "Raid night: moved to Friday");
    let report = world
        .engine
        .manager
        .update_related_messages(&Entity::Event(renamed))
        .await;

    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert_eq!(report.updated.len(), 2);
    let stored_info = world
        .platform
        .message("announce", &info.id)
        .expect("info message");
    assert_eq!(
        stored_info.embeds[0].title.as_deref(),
        Some("Raid night: moved to Friday")
    );
    let stored_calendar = world
        .platform
        .message("calendar", &calendar.id)
        .expect("calendar message");
    assert!(stored_calendar.embeds[0]
        .description
        .as_deref()
        .unwrap_or_default()
        .contains("[Raid night: moved to Friday]"));
    assert_eq!(stored_calendar.author, MessageAuthor::Webhook);
}

#[tokio::test]
async fn integration_fan_out_isolates_single_failed_edit() {
    let world = world();
    let target = event(7, "Board games");
    world.store.upsert_event(target.clone());
    let payload = EventInfoVariant::render(&target, &[]);
    let messages = (0..5)
        .map(|_| post(&world, "announce", MessageAuthor::Bot, &payload))
        .collect::<Vec<_>>();
    world.platform.fail_edits_of(&messages[2].id);

    let report = world
        .engine
        .manager
        .update_related_messages(&Entity::Event(target))
        .await;

    assert_eq!(report.updated.len(), 4);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(
        report.failures[0].message_id.as_deref(),
        Some(messages[2].id.as_str())
    );
    assert!(report
        .updated
        .iter()
        .all(|message| message.id != messages[2].id));
}

#[tokio::test(start_paused = true)]
async fn integration_scheduler_coalesces_burst_into_single_refresh() {
    let world = world();
    let target = event(42, "Quiz");
    world.store.upsert_event(target.clone());
    post(
        &world,
        "announce",
        MessageAuthor::Bot,
        &EventInfoVariant::render(&target, &[]),
    );

    for attempt in 0..10 {
        world
            .engine
            .scheduler
            .enqueue_entity(&Entity::Event(rename(&world, 42, &format!("Quiz v{attempt}"))));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(world.platform.edit_calls().is_empty());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(world.platform.edit_calls().len(), 1);
    assert_eq!(world.engine.scheduler.stats().batches_run, 1);
    assert_eq!(world.engine.scheduler.phase(), SchedulerPhase::Idle);
    let refreshed = world
        .platform
        .list_recent_messages("announce", 1)
        .await
        .expect("history");
    assert_eq!(refreshed[0].embeds[0].title.as_deref(), Some("Quiz v9"));
}

#[tokio::test(start_paused = true)]
async fn integration_flush_now_refreshes_preparation_panel_immediately() {
    let world = world();
    world.store.upsert_event(event(3, "Movie night"));
    let panel = post(
        &world,
        "prep",
        MessageAuthor::Bot,
        &PreparationStatusVariant::render(&[]),
    );
    let request = PreparationRequest {
        id: 11,
        event_id: 3,
        task: "Projector".to_string(),
        assignee: "kai".to_string(),
        prepared: false,
    };
    world.store.upsert_preparation(request);

    world.engine.scheduler.enqueue(EntityKey::preparation(11));
    let summary = world.engine.scheduler.flush_now().await;

    assert_eq!(summary.processed, 1);
    let refreshed = world.platform.message("prep", &panel.id).expect("panel");
    assert!(refreshed.content.contains("waiting on: Projector (kai)"));

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(world.engine.scheduler.stats().batches_run, 1);
}

#[tokio::test]
async fn integration_webhook_owned_view_never_touches_bot_identity() {
    let world = world();
    let message = post(
        &world,
        "calendar",
        MessageAuthor::Webhook,
        &CalendarVariant::render(&[], 14),
    );
    world.platform.clear_calls();

    world
        .engine
        .manager
        .update_message(&message, None)
        .await
        .expect("update");
    world
        .engine
        .gateway
        .refetch(&message)
        .await
        .expect("refetch");

    let calls = world.platform.calls();
    assert_eq!(
        calls[0],
        PlatformCall::FetchOrCreateWebhook {
            channel_id: "calendar".to_string()
        }
    );
    assert!(calls
        .iter()
        .all(|call| call.identity() != Some(MessageAuthor::Bot)));
    assert_eq!(world.platform.webhooks_created(), 1);
}

#[tokio::test]
async fn integration_reply_continuity_keeps_one_visible_reply() {
    let world = world();
    let platform: Arc<dyn ChatPlatform> = world.platform.clone();
    let tokens = ["t1", "t2", "t3"].map(|id| Interaction::new(id, "app", format!("tok-{id}")));
    let tracker = ReplyContinuity::new(platform, tokens[0].clone());

    let mut edited_ids = Vec::new();
    for (step, token) in tokens.iter().enumerate() {
        let reply = tracker
            .edit_reply(Some(token), &MessagePayload::text(format!("step {step}")))
            .await
            .expect("edit reply");
        edited_ids.push(reply.id);
    }

    assert!(edited_ids.windows(2).all(|pair| pair[0] == pair[1]));
    assert!(world.platform.interaction_reply(&tokens[1]).is_none());
    assert!(world.platform.interaction_reply(&tokens[2]).is_none());
    assert_eq!(
        world
            .platform
            .interaction_reply(&tokens[0])
            .map(|reply| reply.content),
        Some("step 2".to_string())
    );
}

#[tokio::test]
async fn integration_every_fixture_is_claimed_by_exactly_one_variant() {
    let world = world();
    let sources = ViewSources {
        store: world.store.clone(),
        platform: world.platform.clone(),
        clock: Arc::new(FixedClock::new(NOW)),
        history_scan_limit: 50,
    };
    let variants: Vec<Arc<dyn MessageVariant>> = vec![
        Arc::new(EventInfoVariant::new(sources.clone(), Vec::new())),
        Arc::new(CalendarVariant::new(sources.clone(), Vec::new(), 14)),
        Arc::new(WeeklyScheduleVariant::new(sources.clone(), Vec::new())),
        Arc::new(PreparationStatusVariant::new(sources, Vec::new())),
    ];
    let sample = event(1, "Sample");
    let monday = NaiveDate::from_ymd_opt(2026, 10, 12).expect("date");
    let sunday = NaiveDate::from_ymd_opt(2026, 10, 18).expect("date");
    let fixtures = vec![
        EventInfoVariant::render(&sample, &[]),
        CalendarVariant::render(std::slice::from_ref(&sample), 14),
        CalendarVariant::render(&[], 7),
        WeeklyScheduleVariant::render(monday, sunday, std::slice::from_ref(&sample)),
        WeeklyScheduleVariant::render(monday, sunday, &[]),
        PreparationStatusVariant::render(&[]),
        PreparationStatusVariant::render(&[(
            sample.clone(),
            vec![PreparationRequest {
                id: 1,
                event_id: 1,
                task: "Snacks".to_string(),
                assignee: "ava".to_string(),
                prepared: false,
            }],
        )]),
    ];

    for payload in fixtures {
        let message = RenderedMessage::default().with_payload(&payload);
        let claims = variants
            .iter()
            .filter(|variant| variant.can_classify(&message))
            .map(|variant| variant.name())
            .collect::<Vec<_>>();
        assert_eq!(claims.len(), 1, "fixture {:?} claimed by {claims:?}", message.content);
    }

    let header_only = RenderedMessage {
        content: weekly_schedule_header(monday, sunday),
        ..RenderedMessage::default()
    };
    let unrelated = RenderedMessage {
        content: "gg everyone".to_string(),
        ..RenderedMessage::default()
    };
    assert!(world.engine.manager.classify(&header_only).is_some());
    assert!(world.engine.manager.classify(&unrelated).is_none());
}

#[tokio::test]
async fn integration_repeated_update_without_mutation_is_byte_identical() {
    let world = world();
    let target = event(9, "Speedrun");
    world.store.upsert_event(target.clone());
    let message = post(
        &world,
        "announce",
        MessageAuthor::Bot,
        &EventInfoVariant::render(&event(9, "stale"), &[]),
    );

    let first = world
        .engine
        .manager
        .update_message(&message, None)
        .await
        .expect("first");
    let second = world
        .engine
        .manager
        .update_message(&first, None)
        .await
        .expect("second");

    assert_eq!(
        serde_json::to_vec(&first.payload()).expect("json"),
        serde_json::to_vec(&second.payload()).expect("json")
    );
    assert_eq!(
        world
            .platform
            .list_recent_messages("announce", 10)
            .await
            .expect("history")
            .len(),
        1
    );
}
