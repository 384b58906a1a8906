use axum::{
    body::Body,
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
};
use uuid::Uuid;

use vestibule::{
    auth::signup::{hash_password, routes},
    models::{User, UserKind},
    StubWebsite,
};

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::now_v7())
}

async fn staff_cookie(app: &StubWebsite) -> String {
    let password = hash_password("admin-password").unwrap();
    let mut tx = app.state().database().start_transaction().await.unwrap();
    let admin = User::create("admin", &unique_email("admin"), &password, true, &mut tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let session = app
        .state()
        .sessions()
        .create_session(Some(&admin), 30, &app.state().config().session_key)
        .await
        .unwrap();
    format!(
        "{}={}",
        app.state().config().session_cookie_name,
        session.id().await
    )
}

fn form_request(uri: &str, cookie: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// The activation path embedded in the last email the stub mailer accepted.
async fn sent_activation_path(app: &StubWebsite) -> String {
    let messages = app.state().mailer().sent_messages().await;
    let raw = messages.last().expect("no invitation email was sent");
    let start = raw.find("/activate/").expect("no activation link in email");
    raw[start..]
        .chars()
        .take_while(|c| !c.is_whitespace())
        .collect()
}

fn session_id_from(response: &axum::http::Response<Body>, cookie_name: &str) -> Option<String> {
    let prefix = format!("{cookie_name}=");
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .and_then(|v| v.split(';').next())
        .map(|v| v[prefix.len()..].to_owned())
}

#[tokio::test]
async fn test_invited_user_activates_once_and_only_once() {
    let app = StubWebsite::new(routes).await;
    let cookie = staff_cookie(&app).await;
    let email = unique_email("new");

    let body = serde_urlencoded::to_string([("email", email.as_str())]).unwrap();
    let response = app.request(form_request("/admin/invite", Some(&cookie), body)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap().to_str().unwrap(),
        app.state().config().invite_redirect_to
    );

    let invited = User::find_by_email(&email, app.state().database())
        .await
        .unwrap()
        .expect("invited user was not created");
    assert!(!invited.is_active);
    assert_eq!(invited.username, format!("user-{}", invited.pk));

    assert_eq!(app.state().mailer().sent_messages().await.len(), 1);
    let path = sent_activation_path(&app).await;

    let response = app
        .request(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = StubWebsite::read_body(response).await;
    assert!(page.contains("Create your account"));

    let body =
        serde_urlencoded::to_string([("username", "newbie"), ("password", "s3cret-pass")]).unwrap();
    let response = app.request(form_request(&path, None, body.clone())).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).unwrap().to_str().unwrap(),
        app.state().config().login_redirect_to
    );

    let session_id = session_id_from(&response, &app.state().config().session_cookie_name)
        .expect("no session cookie set after activation");
    let session = app
        .state()
        .sessions()
        .find_session(&session_id)
        .await
        .unwrap()
        .expect("rotated session was not stored");
    let activated = User::find_by_email(&email, app.state().database())
        .await
        .unwrap()
        .unwrap();
    assert!(activated.is_active);
    assert_eq!(activated.username, "newbie");
    assert_eq!(session.user_pk().await, Some(activated.pk));

    // The active flag changed, so the very same link is now dead.
    let response = app.request(form_request(&path, None, body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(StubWebsite::read_body(response)
        .await
        .contains("Invalid user token"));

    let response = app
        .request(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inviting_an_email_already_attached_sends_nothing() {
    let app = StubWebsite::new(routes).await;
    let cookie = staff_cookie(&app).await;
    let email = unique_email("member");

    let mut tx = app.state().database().start_transaction().await.unwrap();
    User::create("member", &email, "hash", false, &mut tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let body = serde_urlencoded::to_string([("email", email.as_str())]).unwrap();
    let response = app.request(form_request("/admin/invite", Some(&cookie), body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(StubWebsite::read_body(response)
        .await
        .contains("This email is already attached to a member."));

    assert!(app.state().mailer().sent_messages().await.is_empty());
    let unchanged = User::find_by_email(&email, app.state().database())
        .await
        .unwrap()
        .unwrap();
    assert!(unchanged.is_active);
    assert_eq!(unchanged.username, "member");
}

#[tokio::test]
async fn test_invite_requires_a_staff_session() {
    let app = StubWebsite::new(routes).await;
    let email = unique_email("anon");

    let body = serde_urlencoded::to_string([("email", email.as_str())]).unwrap();
    let response = app.request(form_request("/admin/invite", None, body)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response
        .headers()
        .get(LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("/?next="));

    assert!(app.state().mailer().sent_messages().await.is_empty());
    assert!(User::find_by_email(&email, app.state().database())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reinvited_external_user_keeps_their_old_username() {
    let app = StubWebsite::new(routes).await;
    let cookie = staff_cookie(&app).await;
    let email = unique_email("imported");

    let mut tx = app.state().database().start_transaction().await.unwrap();
    let imported = User::create_external("old-handle", &mut tx).await.unwrap();
    tx.commit().await.unwrap();

    let body = serde_urlencoded::to_string([
        ("email", email.as_str()),
        ("is_editor", "true"),
    ])
    .unwrap();
    let response = app
        .request(form_request(
            &format!("/admin/invite/{}", imported.pk),
            Some(&cookie),
            body,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let path = sent_activation_path(&app).await;
    let response = app
        .request(Request::builder().uri(&path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = StubWebsite::read_body(response).await;
    assert!(page.contains("Recover your account"));
    assert!(page.contains("old-handle"));

    let body =
        serde_urlencoded::to_string([("username", "ignored"), ("password", "s3cret-pass")]).unwrap();
    let response = app.request(form_request(&path, None, body)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let activated = User::find_by_email(&email, app.state().database())
        .await
        .unwrap()
        .unwrap();
    assert!(activated.is_active);
    assert!(activated.is_editor);
    assert_eq!(activated.username, "old-handle");
    assert_eq!(activated.kind, UserKind::Normal);
}

#[tokio::test]
async fn test_tampered_link_is_a_generic_bad_request() {
    let app = StubWebsite::new(routes).await;
    let cookie = staff_cookie(&app).await;
    let email = unique_email("tampered");

    let body = serde_urlencoded::to_string([("email", email.as_str())]).unwrap();
    app.request(form_request("/admin/invite", Some(&cookie), body)).await;

    let path = sent_activation_path(&app).await;
    let mut tampered = path.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == '0' { '1' } else { '0' });

    let body =
        serde_urlencoded::to_string([("username", "newbie"), ("password", "s3cret-pass")]).unwrap();
    let response = app.request(form_request(&tampered, None, body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(StubWebsite::read_body(response)
        .await
        .contains("Invalid user token"));

    // An unknown or undecodable uid gets the very same answer.
    let body =
        serde_urlencoded::to_string([("username", "newbie"), ("password", "s3cret-pass")]).unwrap();
    let response = app
        .request(form_request("/activate/%21%21/whatever-token", None, body))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
