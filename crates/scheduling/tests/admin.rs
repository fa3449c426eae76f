mod common;

use tutor_core::{LessonUpdate, NewRescheduleRequest, RequestStatus, RescheduleSettings};

use common::{at, d, t, Harness};

#[tokio::test]
async fn duplicate_start_is_a_conflict() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    h.admin.add_lesson(5, 2, "14:00", 60).await.unwrap();

    let err = h.admin.add_lesson(5, 2, "14:00", 45).await.unwrap_err();
    assert!(err.is_conflict());
    // Another student may share the start time.
    h.admin.add_lesson(6, 2, "14:00", 60).await.unwrap();
    // Start-time equality only: an overlapping start is accepted.
    h.admin.add_lesson(5, 2, "14:30", 60).await.unwrap();
    assert_eq!(h.admin.list_lessons(5).await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalid_lessons_are_rejected() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    assert!(h.admin.add_lesson(5, 7, "14:00", 60).await.unwrap_err().is_validation());
    assert!(h.admin.add_lesson(5, 1, "25:00", 60).await.unwrap_err().is_validation());
    assert!(h.admin.add_lesson(5, 1, "14:00", 0).await.unwrap_err().is_validation());
    assert!(h.admin.update_lesson(999, LessonUpdate::default()).await.unwrap_err().is_not_found());
    assert!(h.admin.delete_lesson(999).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn lesson_changes_refresh_slots() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    h.open_every_day(60).await;
    let monday = d("2026-10-19");

    let before = h.slots.get_available_slots(monday, 60).await.unwrap();
    assert_eq!(before[0].start, t("10:00"));

    let lesson = h.admin.add_lesson(1, 0, "10:00", 60).await.unwrap();
    let after_add = h.slots.get_available_slots(monday, 60).await.unwrap();
    assert_eq!(after_add[0].start, t("11:00"));

    h.admin
        .update_lesson(
            lesson.id,
            LessonUpdate {
                day_of_week: Some(1),
                ..LessonUpdate::default()
            },
        )
        .await
        .unwrap();
    let after_move = h.slots.get_available_slots(monday, 60).await.unwrap();
    assert_eq!(after_move, before);
}

#[tokio::test]
async fn settings_update_refreshes_slots() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    let monday = d("2026-10-19");
    assert_eq!(h.slots.get_available_slots(monday, 60).await.unwrap().len(), 17);

    let updated = h
        .admin
        .update_settings(&RescheduleSettings {
            work_start: t("15:00"),
            ..RescheduleSettings::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.work_start, t("15:00"));
    assert_eq!(h.admin.settings().await.unwrap(), updated);

    let slots = h.slots.get_available_slots(monday, 60).await.unwrap();
    assert_eq!(slots[0].start_label(), "15:00");
    assert_eq!(slots.len(), 7);
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    let err = h
        .admin
        .update_settings(&RescheduleSettings {
            work_start: t("19:00"),
            work_end: t("10:00"),
            ..RescheduleSettings::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.admin.settings().await.unwrap(), RescheduleSettings::default());
}

#[tokio::test]
async fn removing_a_student_clears_lessons_and_timers() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    h.admin.add_lesson(5, 0, "10:00", 60).await.unwrap();
    h.admin.add_lesson(5, 3, "16:00", 60).await.unwrap();
    h.admin.add_lesson(6, 3, "16:00", 60).await.unwrap();
    assert_eq!(h.timers.keys().len(), 3);

    assert_eq!(h.admin.delete_student_lessons(5).await.unwrap(), 2);
    assert!(h.admin.list_lessons(5).await.unwrap().is_empty());
    assert_eq!(h.timers.keys().len(), 1);
    assert_eq!(h.admin.list_lessons(6).await.unwrap().len(), 1);
}

#[tokio::test]
async fn processing_requests() {
    let h = Harness::new(at("2026-10-18", "12:00")).await;
    let lesson = h.admin.add_lesson(5, 0, "10:00", 60).await.unwrap();
    let request = h
        .requests
        .create(&NewRescheduleRequest {
            student_id: 5,
            schedule_id: lesson.id,
            original_date: d("2026-10-19"),
            original_time: t("10:00"),
            requested_date: d("2026-10-20"),
            requested_time: t("15:00"),
        })
        .await
        .unwrap();
    assert_eq!(h.admin.pending_requests().await.unwrap().len(), 1);

    let processed = h.admin.mark_request_processed(request.id).await.unwrap();
    assert_eq!(processed.status, RequestStatus::Processed);
    assert!(h.admin.pending_requests().await.unwrap().is_empty());
    assert!(h.admin.mark_request_processed(4242).await.unwrap_err().is_not_found());

    // Processing a request does not move the lesson.
    let unchanged = h.lessons.get(lesson.id).await.unwrap();
    assert_eq!((unchanged.day_of_week, unchanged.time), (0, t("10:00")));
}
