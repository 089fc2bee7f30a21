mod common;

use std::sync::Arc;
use std::time::Duration;

use vpnpanel_client::{
    AdminAllowList, AdminReviewScreen, AuthFlow, ClientError, MemoryBlobStore, MemoryStore,
    MutationOutcome, PayScreen, Route, Screen, ScreenDeps, SessionStore, SqliteStore, route,
};
use vpnpanel_types::{PaymentStatus, TelegramAuthPayload};

use common::{FakeApi, identity, proof, proof_with_file, signed_in_store, user};

fn deps(api: &Arc<FakeApi>, blobs: &Arc<MemoryBlobStore>) -> ScreenDeps<FakeApi, MemoryBlobStore> {
    ScreenDeps {
        api: api.clone(),
        blobs: blobs.clone(),
        sessions: signed_in_store(),
        identity: identity(),
        poll_interval: Duration::from_secs(5),
    }
}

#[tokio::test(start_paused = true)]
async fn pay_screen_polls_and_releases_images_on_unmount() {
    let api = FakeApi::new();
    *api.mine.lock().unwrap() = vec![proof_with_file(1, 42)];
    api.images
        .lock()
        .unwrap()
        .insert("/api/payment-proofs/1/file/".into(), vec![9; 3]);
    let blobs = Arc::new(MemoryBlobStore::new());

    let screen = PayScreen::mount(deps(&api, &blobs));
    let mut changes = screen.changes();
    changes.changed().await.unwrap();

    assert_eq!(screen.snapshot().items.len(), 1);
    let images = screen.images_settled().await;
    assert_eq!(images.len(), 1);
    assert_eq!(blobs.live_count(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(api.count("list_mine"), 3);
    // Steady list: the image was fetched once.
    assert_eq!(api.count("image"), 1);

    screen.unmount().await;
    assert_eq!(blobs.live_count(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.count("list_mine"), 3);
}

#[tokio::test(start_paused = true)]
async fn admin_screen_moderates_and_resyncs() {
    let api = FakeApi::new();
    *api.users.lock().unwrap() = vec![user(7, 1)];
    api.proofs_by_user
        .lock()
        .unwrap()
        .insert(7, vec![proof(1, 7, PaymentStatus::Pending)]);
    let blobs = Arc::new(MemoryBlobStore::new());

    let screen = AdminReviewScreen::mount(deps(&api, &blobs));
    let mut changes = screen.changes();
    changes.changed().await.unwrap();
    assert_eq!(screen.snapshot().selected_user_id, Some(7));

    assert_eq!(screen.approve(1).await.unwrap(), MutationOutcome::Applied);
    assert_eq!(screen.snapshot().proofs[0].status, PaymentStatus::Approved);
    assert_eq!(screen.approve(1).await.unwrap(), MutationOutcome::Unchanged);

    screen.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn preselected_user_is_loaded_first() {
    let api = FakeApi::new();
    *api.users.lock().unwrap() = vec![user(7, 1), user(8, 2)];
    api.proofs_by_user
        .lock()
        .unwrap()
        .insert(8, vec![proof(3, 8, PaymentStatus::Pending)]);
    let blobs = Arc::new(MemoryBlobStore::new());

    let screen = AdminReviewScreen::mount_with_selection(deps(&api, &blobs), Some(8));
    let mut changes = screen.changes();
    changes.changed().await.unwrap();

    let snap = screen.snapshot();
    assert_eq!(snap.selected_user_id, Some(8));
    assert_eq!(snap.proofs[0].id, 3);
    assert_eq!(api.count("list_user 7"), 0);
    screen.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_session_stops_pay_screen_polling() {
    let api = FakeApi::new();
    *api.unauthorized.lock().unwrap() = true;
    let blobs = Arc::new(MemoryBlobStore::new());

    let screen = PayScreen::mount(deps(&api, &blobs));
    let mut changes = screen.changes();
    changes.changed().await.unwrap();

    assert!(screen.signed_out());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.count("list_mine"), 1);
    screen.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn rejected_session_on_action_stops_admin_screen() {
    let api = FakeApi::new();
    *api.users.lock().unwrap() = vec![user(7, 1)];
    api.proofs_by_user
        .lock()
        .unwrap()
        .insert(7, vec![proof(1, 7, PaymentStatus::Pending)]);
    let blobs = Arc::new(MemoryBlobStore::new());

    let screen = AdminReviewScreen::mount(deps(&api, &blobs));
    let mut changes = screen.changes();
    changes.changed().await.unwrap();
    assert!(!screen.signed_out());

    *api.unauthorized.lock().unwrap() = true;
    assert!(matches!(screen.approve(1).await, Err(ClientError::NotAuthenticated)));
    assert!(screen.signed_out());

    let polls = api.count("list_users");
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.count("list_users"), polls);
    screen.unmount().await;
}

#[tokio::test]
async fn login_persists_session_and_logout_clears_it() {
    let api = FakeApi::new();
    let sessions = SessionStore::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
    let flow = AuthFlow::new(api.clone(), sessions.clone());
    let admins = AdminAllowList::parse("[42]");

    assert_eq!(route(Screen::AdminReview, flow.current().as_ref(), &admins), Route::Redirect(Screen::Auth));

    let payload = TelegramAuthPayload {
        id: 42,
        first_name: None,
        last_name: None,
        username: Some("bob".into()),
        photo_url: None,
        auth_date: Some(1),
        hash: Some("h".into()),
    };
    let session = flow.on_telegram_auth(&payload).await.unwrap();
    assert_eq!(session.token, "token-42");
    assert_eq!(sessions.token(), "token-42");
    assert_eq!(route(Screen::AdminReview, flow.current().as_ref(), &admins), Route::Show(Screen::AdminReview));

    flow.logout().unwrap();
    assert!(flow.current().is_none());
    assert_eq!(sessions.token(), "");
}

#[tokio::test]
async fn login_failure_is_reported_and_nothing_stored() {
    let api = FakeApi::new();
    *api.login_error.lock().unwrap() = Some("Invalid Telegram signature".into());
    let sessions = SessionStore::new(Arc::new(MemoryStore::new()));
    let flow = AuthFlow::new(api, sessions.clone());

    let payload = TelegramAuthPayload {
        id: 42,
        first_name: None,
        last_name: None,
        username: None,
        photo_url: None,
        auth_date: None,
        hash: None,
    };
    match flow.on_telegram_auth(&payload).await {
        Err(ClientError::Rejected(msg)) => assert_eq!(msg, "Authorization failed: Invalid Telegram signature"),
        other => panic!("unexpected: {:?}", other.map(|s| s.token)),
    }
    assert!(sessions.get_stored_user().is_none());
}
