//! Unit tests for the weekly lesson store.

use chrono::NaiveDate;
use tutor_core::time::parse_hhmm;

use super::*;
use crate::db::memory_pool;

async fn store() -> ScheduleStore {
    ScheduleStore::new(memory_pool().await.unwrap())
}

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(parse_hhmm(time).unwrap())
}

#[tokio::test]
async fn add_then_list_orders_by_day_and_time() {
    let store = store().await;
    store.add(1, 3, "09:00", 60).await.unwrap();
    store.add(1, 0, "18:00", 45).await.unwrap();
    store.add(1, 0, "08:30", 60).await.unwrap();
    store.add(2, 0, "07:00", 60).await.unwrap();

    let lessons = store.list(1).await.unwrap();
    let keys: Vec<_> = lessons.iter().map(|l| (l.day_of_week, l.time_label())).collect();
    assert_eq!(
        keys,
        vec![(0, "08:30".to_string()), (0, "18:00".to_string()), (3, "09:00".to_string())]
    );
    assert!(lessons.iter().all(|l| l.active && l.student_id == 1));
    assert_eq!(lessons[1].duration_minutes, 45);
}

#[tokio::test]
async fn duplicate_add_is_conflict_and_keeps_one_row() {
    let store = store().await;
    store.add(5, 2, "14:00", 60).await.unwrap();

    let err = store.add(5, 2, "14:00", 90).await.unwrap_err();
    assert!(err.is_conflict(), "{err:?}");
    assert!(!err.is_validation());

    let matching: Vec<_> = store
        .list(5)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.day_of_week == 2 && l.time_label() == "14:00")
        .collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].duration_minutes, 60);
}

#[tokio::test]
async fn exact_start_policy_accepts_overlapping_start() {
    let store = store().await;
    store.add(5, 2, "14:00", 60).await.unwrap();
    assert!(store.add(5, 2, "14:30", 60).await.is_ok());
}

#[tokio::test]
async fn overlap_policy_rejects_intersecting_lessons() {
    let store = store().await.with_policy(ConflictPolicy::Overlap);
    store.add(5, 2, "14:00", 60).await.unwrap();

    let err = store.add(5, 2, "14:30", 60).await.unwrap_err();
    assert!(err.is_conflict());
    // Touching the end is fine.
    store.add(5, 2, "15:00", 60).await.unwrap();
    // Another student is unaffected.
    store.add(6, 2, "14:30", 60).await.unwrap();
}

#[tokio::test]
async fn same_slot_is_free_for_other_students_and_days() {
    let store = store().await;
    store.add(1, 2, "14:00", 60).await.unwrap();
    store.add(2, 2, "14:00", 60).await.unwrap();
    store.add(1, 3, "14:00", 60).await.unwrap();
    assert_eq!(store.list_for_weekday(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn add_validates_input() {
    let store = store().await;
    assert!(store.add(1, 7, "10:00", 60).await.unwrap_err().is_validation());
    assert!(store.add(1, 0, "25:00", 60).await.unwrap_err().is_validation());
    assert!(store.add(1, 0, "10:00", 0).await.unwrap_err().is_validation());

    let err = store.add(1, 0, "23:30", 60).await.unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("exceeds working hours"));
    assert!(store.list(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_into_conflict_changes_nothing() {
    let store = store().await;
    let a = store.add(1, 0, "10:00", 60).await.unwrap();
    let b = store.add(1, 0, "12:00", 60).await.unwrap();

    let err = store
        .update(
            a.id,
            LessonUpdate {
                time: Some("12:00".into()),
                duration_minutes: Some(30),
                ..LessonUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let a_after = store.get(a.id).await.unwrap();
    let b_after = store.get(b.id).await.unwrap();
    assert_eq!(a_after.time_label(), "10:00");
    assert_eq!(a_after.duration_minutes, 60);
    assert_eq!(b_after, b);
}

#[tokio::test]
async fn update_moves_lesson() {
    let store = store().await;
    let lesson = store.add(1, 0, "10:00", 60).await.unwrap();

    let moved = store
        .update(
            lesson.id,
            LessonUpdate {
                day_of_week: Some(4),
                time: Some("16:15".into()),
                ..LessonUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.day_of_week, 4);
    assert_eq!(moved.time_label(), "16:15");
    assert_eq!(moved.duration_minutes, 60);
    assert!(moved.updated_at >= lesson.updated_at);

    // Original slot is free again.
    store.add(1, 0, "10:00", 60).await.unwrap();
}

#[tokio::test]
async fn deactivate_frees_slot_and_reactivation_is_checked() {
    let store = store().await;
    let first = store.add(1, 1, "09:00", 60).await.unwrap();
    store
        .update(
            first.id,
            LessonUpdate {
                active: Some(false),
                ..LessonUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(store.list(1).await.unwrap().is_empty());

    store.add(1, 1, "09:00", 60).await.unwrap();
    let err = store
        .update(
            first.id,
            LessonUpdate {
                active: Some(true),
                ..LessonUpdate::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn empty_update_returns_current() {
    let store = store().await;
    let lesson = store.add(1, 1, "09:00", 60).await.unwrap();
    let same = store.update(lesson.id, LessonUpdate::default()).await.unwrap();
    assert_eq!(same, lesson);
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let store = store().await;
    assert!(store.get(42).await.unwrap_err().is_not_found());
    assert!(store.delete(42).await.unwrap_err().is_not_found());
    assert!(store
        .update(42, LessonUpdate { active: Some(false), ..LessonUpdate::default() })
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn delete_and_delete_for_student() {
    let store = store().await;
    let lesson = store.add(1, 1, "09:00", 60).await.unwrap();
    store.add(1, 2, "09:00", 60).await.unwrap();
    store.add(2, 2, "09:00", 60).await.unwrap();

    store.delete(lesson.id).await.unwrap();
    assert_eq!(store.list(1).await.unwrap().len(), 1);

    assert_eq!(store.delete_for_student(1).await.unwrap(), 1);
    assert_eq!(store.list_student_ids().await.unwrap(), vec![2]);
}

#[tokio::test]
async fn next_occurrence_rolls_over_past_lesson() {
    let store = store().await;
    store.add(1, 2, "10:00", 60).await.unwrap();

    // Wednesday 15:00: today's 10:00 lesson has passed.
    let next = store
        .next_occurrence(1, at("2026-10-21", "15:00"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.date, NaiveDate::from_ymd_opt(2026, 10, 28).unwrap());
    assert_eq!(next.weekday_name, "Wednesday");
    assert_eq!(next.time, "10:00");
    assert_eq!(next.duration_minutes, 60);

    assert!(store
        .next_occurrence(99, at("2026-10-21", "15:00"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_of_one_slot_admit_a_single_winner() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tutor_core::config::DatabaseConfig {
        url: format!("sqlite://{}", tmp.path().join("lessons.db").display()),
        max_connections: 8,
    };
    let store = ScheduleStore::new(crate::db::init_pool(&config).await.unwrap());

    for (round, day) in (0..5u8).enumerate() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.add(99, day, "10:00", 30).await })
            })
            .collect();

        let mut won = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(e) => assert!(e.is_conflict(), "round {round}: {e}"),
            }
        }
        assert_eq!(won, 1, "round {round}");
    }
    assert_eq!(store.list(99).await.unwrap().len(), 5);
}
