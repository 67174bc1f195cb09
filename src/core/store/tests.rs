use rusqlite::params;
use tempfile::TempDir;

use super::FleetStore;
use super::query::ListOptions;
use super::types::ScheduleRecord;

async fn open_store() -> (TempDir, FleetStore) {
    let dir = TempDir::new().expect("tempdir");
    let store = FleetStore::new(dir.path()).await.expect("open store");
    (dir, store)
}

fn schedule(id: &str, name: &str) -> ScheduleRecord {
    ScheduleRecord {
        id: id.to_string(),
        created_at: String::new(),
        created_by: "tester".into(),
        name: name.to_string(),
        schedule: "0 0 * * * *".into(),
        kind: "command".into(),
        details: r#"{"client_ids":["a"],"command":"uptime"}"#.into(),
        last_started_at: None,
    }
}

/// Rewrites a job's started_at so it looks `secs_ago` seconds old.
async fn backdate_job(store: &FleetStore, job_id: &str, secs_ago: i64) {
    let db = store.db();
    let db = db.lock().await;
    db.execute(
        "UPDATE jobs SET started_at = datetime('now', ?1 || ' seconds') WHERE job_id = ?2",
        params![-secs_ago, job_id],
    )
    .expect("backdate");
}

#[tokio::test]
async fn jobs_start_in_flight_and_finish_with_outcome() {
    let (_dir, store) = open_store().await;

    let mj = store.create_multi_job(None).await.unwrap();
    let job = store.create_job(&mj.jid, "agent-1").await.unwrap();
    assert_eq!(job.status, "running");
    assert!(job.finished_at.is_none());

    assert!(
        store
            .finish_job(&job.job_id, "success", Some("done"))
            .await
            .unwrap()
    );
    let finished = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(finished.status, "success");
    assert!(finished.finished_at.is_some());

    assert!(!store.finish_job("no-such-job", "failed", None).await.unwrap());
}

#[tokio::test]
async fn one_job_per_agent_within_a_multi_job() {
    let (_dir, store) = open_store().await;

    let mj = store.create_multi_job(None).await.unwrap();
    store.create_job(&mj.jid, "agent-1").await.unwrap();
    assert!(store.create_job(&mj.jid, "agent-1").await.is_err());
}

#[tokio::test]
async fn in_progress_count_honors_the_staleness_window() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    let mj = store.create_multi_job(Some("sched-1")).await.unwrap();
    let fresh = store.create_job(&mj.jid, "agent-1").await.unwrap();
    let stale = store.create_job(&mj.jid, "agent-2").await.unwrap();
    let done = store.create_job(&mj.jid, "agent-3").await.unwrap();

    // agent-2 started two hours ago and never finished; agent-3 finished.
    backdate_job(&store, &stale.job_id, 7200).await;
    store.finish_job(&done.job_id, "success", None).await.unwrap();

    assert_eq!(store.count_jobs_in_progress("sched-1", 300).await.unwrap(), 1);

    store.finish_job(&fresh.job_id, "failed", Some("boom")).await.unwrap();
    assert_eq!(store.count_jobs_in_progress("sched-1", 300).await.unwrap(), 0);

    // With a window wider than its age, the stale job counts again.
    assert_eq!(
        store.count_jobs_in_progress("sched-1", 10_000).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn abandoned_job_alone_does_not_block_the_schedule() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    let mj = store.create_multi_job(Some("sched-1")).await.unwrap();
    let job = store.create_job(&mj.jid, "agent-1").await.unwrap();
    backdate_job(&store, &job.job_id, 7200).await;

    assert_eq!(store.count_jobs_in_progress("sched-1", 300).await.unwrap(), 0);
}

#[tokio::test]
async fn schedule_delete_cascades_to_multi_jobs_and_jobs() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    let mj1 = store.create_multi_job(Some("sched-1")).await.unwrap();
    let mj2 = store.create_multi_job(Some("sched-1")).await.unwrap();
    store.create_job(&mj1.jid, "agent-1").await.unwrap();
    store.create_job(&mj1.jid, "agent-2").await.unwrap();
    store.create_job(&mj2.jid, "agent-1").await.unwrap();

    // A manual run is untouched by the cascade.
    let manual = store.create_multi_job(None).await.unwrap();
    store.create_job(&manual.jid, "agent-1").await.unwrap();

    assert!(store.delete_schedule("sched-1").await.unwrap());
    assert!(store.get_schedule("sched-1").await.unwrap().is_none());
    assert!(store.get_multi_job(&mj1.jid).await.unwrap().is_none());
    assert!(store.get_multi_job(&mj2.jid).await.unwrap().is_none());
    assert!(store.list_jobs_for_multi_job(&mj1.jid).await.unwrap().is_empty());
    assert!(store.list_jobs_for_multi_job(&mj2.jid).await.unwrap().is_empty());

    assert!(store.get_multi_job(&manual.jid).await.unwrap().is_some());
    assert_eq!(store.list_jobs_for_multi_job(&manual.jid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deleting_an_unknown_schedule_is_distinguishable() {
    let (_dir, store) = open_store().await;
    assert!(!store.delete_schedule("no-such-id").await.unwrap());
}

#[tokio::test]
async fn listing_schedules_attaches_last_started_at() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    store.insert_schedule(&schedule("sched-2", "weekly")).await.unwrap();

    store.create_multi_job(Some("sched-1")).await.unwrap();
    // Make the second run unambiguously the most recent one.
    let later = store.create_multi_job(Some("sched-1")).await.unwrap();
    {
        let db = store.db();
        let db = db.lock().await;
        db.execute(
            "UPDATE multi_jobs SET started_at = datetime('now', '+60 seconds') WHERE jid = ?1",
            params![later.jid],
        )
        .unwrap();
    }
    let later = store.get_multi_job(&later.jid).await.unwrap().unwrap();

    let schedules = store.list_schedules(&ListOptions::default()).await.unwrap();
    let by_id = |id: &str| schedules.iter().find(|s| s.id == id).unwrap();

    assert_eq!(
        by_id("sched-1").last_started_at.as_deref(),
        Some(later.started_at.as_str())
    );
    assert!(by_id("sched-2").last_started_at.is_none());
}

#[tokio::test]
async fn schedule_update_touches_only_mutable_fields() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    let before = store.get_schedule("sched-1").await.unwrap().unwrap();

    let mut updated = schedule("sched-1", "nightly-renamed");
    updated.schedule = "0 30 * * * *".into();
    assert!(store.update_schedule(&updated).await.unwrap());

    let after = store.get_schedule("sched-1").await.unwrap().unwrap();
    assert_eq!(after.name, "nightly-renamed");
    assert_eq!(after.schedule, "0 30 * * * *");
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.created_by, before.created_by);

    assert!(!store.update_schedule(&schedule("ghost", "x")).await.unwrap());
}

#[tokio::test]
async fn command_save_inserts_then_updates_in_place() {
    let (_dir, store) = open_store().await;

    let id = store
        .save_command("", "disk usage", "df -h", "alice")
        .await
        .unwrap();
    assert!(!id.is_empty());

    let saved = store.get_command(&id).await.unwrap().unwrap();
    assert_eq!(saved.created_by, "alice");
    assert_eq!(saved.cmd, "df -h");

    let same_id = store
        .save_command(&id, "disk usage", "df -h /var", "bob")
        .await
        .unwrap();
    assert_eq!(same_id, id);

    let updated = store.get_command(&id).await.unwrap().unwrap();
    assert_eq!(updated.cmd, "df -h /var");
    assert_eq!(updated.created_by, "alice");
    assert_eq!(updated.updated_by, "bob");

    assert!(store.delete_command(&id).await.unwrap());
    assert!(!store.delete_command(&id).await.unwrap());
    assert!(store.get_command(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn multi_job_listing_filters_by_schedule() {
    let (_dir, store) = open_store().await;

    store.insert_schedule(&schedule("sched-1", "nightly")).await.unwrap();
    store.create_multi_job(Some("sched-1")).await.unwrap();
    store.create_multi_job(None).await.unwrap();

    let params = [("filter[schedule_id]".to_string(), "sched-1".to_string())]
        .into_iter()
        .collect();
    let options = ListOptions::from_query(&params, &["schedule_id", "started_at"]).unwrap();

    let listed = store.list_multi_jobs(&options).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].schedule_id.as_deref(), Some("sched-1"));
}
