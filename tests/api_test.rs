use std::io::Cursor;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use calamine::{Reader, Xlsx};
use chrono::Utc;
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use taskboard::api::router;
use taskboard::auth::{generate_token, hash_password};
use taskboard::config::AppConfig;
use taskboard::db::repository;
use taskboard::models::{Role, User};
use taskboard::state::AppState;

const TEST_SECRET: &str = "test-secret";
const INVITE_KEY: &str = "invite-key";

async fn setup() -> (Router, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let config = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_SECRET.to_string(),
        admin_invite_token: INVITE_KEY.to_string(),
        port: 0,
    };
    let state = AppState {
        db: pool.clone(),
        config: Arc::new(config),
    };
    (router(state), pool)
}

async fn seed_user(pool: &SqlitePool, name: &str, email: &str, role: Role) -> User {
    let now = Utc::now().to_rfc3339();
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash: hash_password("password123").unwrap(),
        role,
        profile_image_url: None,
        created_by: None,
        created_at: now.clone(),
        updated_at: now,
    };
    repository::insert_user(pool, &user).await.unwrap();
    user
}

fn bearer(user: &User) -> String {
    format!("Bearer {}", generate_token(&user.id, TEST_SECRET).unwrap())
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_upload(uri: &str, token: &str, xlsx: Vec<u8>) -> Request<Body> {
    let boundary = "test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"import.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&xlsx);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Builds a one-sheet workbook: header row plus string data rows.
fn workbook_bytes(sheet: &str, headers: &[&str], rows: &[Vec<&str>]) -> Vec<u8> {
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet).unwrap();
    for (c, h) in headers.iter().enumerate() {
        worksheet.write_string(0, c as u16, *h).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                worksheet.write_string((r + 1) as u32, c as u16, *value).unwrap();
            }
        }
    }
    let mut workbook = Workbook::new();
    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().unwrap()
}

#[tokio::test]
async fn register_login_and_checklist_sync() {
    let (app, pool) = setup().await;
    let admin = seed_user(&pool, "Admin", "admin@example.com", Role::Admin).await;

    // Self-service signup lands as a member.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            None,
            json!({"name": "Mia", "email": "mia@example.com", "password": "hunter22"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let member: Value = response_json(response).await;
    assert_eq!(member["role"], "member");
    let member_id = member["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            None,
            json!({"email": "Mia@Example.com", "password": "hunter22"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(header::SET_COOKIE));
    let login: Value = response_json(response).await;
    let member_token = format!("Bearer {}", login["token"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks/",
            Some(&bearer(&admin)),
            json!({
                "title": "Quarterly report",
                "description": "",
                "priority": "high",
                "dueDate": "2027-01-15",
                "assignedTo": [member_id],
                "todoChecklist": [
                    {"text": "draft"},
                    {"text": "review"},
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task: Value = response_json(response).await;
    assert_eq!(task["status"], "pending");
    assert_eq!(task["progress"], 0);
    let task_id = task["id"].as_str().unwrap().to_string();

    // Member ticks one item; status and progress follow the checklist.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tasks/{task_id}/status"),
            Some(&member_token),
            json!({"todoChecklist": [
                {"text": "draft", "completed": true},
                {"text": "review", "completed": false},
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let task: Value = response_json(response).await;
    assert_eq!(task["status"], "in-progress");
    assert_eq!(task["progress"], 50);
    assert_eq!(task["completedTodoCount"], 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/tasks/{task_id}/status"),
            Some(&member_token),
            json!({"todoChecklist": [
                {"text": "draft", "completed": true},
                {"text": "review", "completed": true},
            ]}),
        ))
        .await
        .unwrap();
    let task: Value = response_json(response).await;
    assert_eq!(task["status"], "completed");
    assert_eq!(task["progress"], 100);
}

#[tokio::test]
async fn admin_hierarchy_gates_user_deletion() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;
    let admin1 = seed_user(&pool, "Admin One", "a1@example.com", Role::Admin).await;
    let admin2 = seed_user(&pool, "Admin Two", "a2@example.com", Role::Admin).await;
    let member = seed_user(&pool, "Member", "m@example.com", Role::Member).await;

    // Admins cannot touch other admins.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/users/{}", admin2.id))
                .header(header::AUTHORIZATION, bearer(&admin1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Nobody deletes the super admin.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/users/{}", root.id))
                .header(header::AUTHORIZATION, bearer(&admin1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admins delete members; super admins delete admins.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/users/{}", member.id))
                .header(header::AUTHORIZATION, bearer(&admin1))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/users/{}", admin2.id))
                .header(header::AUTHORIZATION, bearer(&root))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        repository::find_user_by_id(&pool, &admin2.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn user_import_commits_good_rows_and_reports_bad_ones() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;

    let headers = ["Name", "Email", "Role"];
    let xlsx = workbook_bytes(
        "Users",
        &headers,
        &[
            vec!["Ann", "ann@example.com", "member"],
            vec!["Bob", "bob@example.com", "member"],
            vec!["Cat", "cat@example.com", "member"],
            vec!["NoEmail", "", "member"],
        ],
    );

    let response = app
        .clone()
        .oneshot(multipart_upload(
            "/api/reports/import/users",
            &bearer(&root),
            xlsx,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response_json(response).await;
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].as_str().unwrap(),
        "[User Import] row 5: Missing required fields"
    );

    // Rows before and after the bad one are committed.
    for email in ["ann@example.com", "bob@example.com", "cat@example.com"] {
        assert!(
            repository::find_user_by_email(&pool, email)
                .await
                .unwrap()
                .is_some(),
            "{email} should have been imported"
        );
    }
}

#[tokio::test]
async fn task_import_rejects_out_of_range_progress() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;

    let headers = ["Title", "CreatedBy", "Progress", "Todos"];
    let xlsx = workbook_bytes(
        "Tasks",
        &headers,
        &[
            vec!["Good task", "root@example.com", "40%", "draft [✔] | review [✘]"],
            vec!["Bad task", "root@example.com", "150%", ""],
        ],
    );

    let response = app
        .clone()
        .oneshot(multipart_upload(
            "/api/reports/import/users-tasks",
            &bearer(&root),
            xlsx,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response_json(response).await;
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].as_str().unwrap(),
        "[Task Import] row 3: Invalid progress value \"150%\""
    );

    let imported = repository::find_task_by_title_and_creator(&pool, "Good task", &root.id)
        .await
        .unwrap()
        .expect("good row should have been imported");
    // Status is derived from the checklist, not the sheet.
    assert_eq!(imported.progress, 50);
    assert_eq!(imported.todo_checklist.len(), 2);
    assert!(
        repository::find_task_by_title_and_creator(&pool, "Bad task", &root.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn user_export_is_role_scoped() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;
    let admin = seed_user(&pool, "Admin", "admin@example.com", Role::Admin).await;
    let member = seed_user(&pool, "Member", "member@example.com", Role::Member).await;

    // Members get no export at all.
    let response = app
        .clone()
        .oneshot(get_request("/api/reports/export/users", &bearer(&member)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admin export carries members only.
    let response = app
        .clone()
        .oneshot(get_request("/api/reports/export/users", &bearer(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("members.xlsx")
    );
    let emails = exported_emails(response).await;
    assert_eq!(emails, vec!["member@example.com".to_string()]);

    // Super admin export carries admins and members, never itself.
    let response = app
        .clone()
        .oneshot(get_request("/api/reports/export/users", &bearer(&root)))
        .await
        .unwrap();
    let emails = exported_emails(response).await;
    assert!(emails.contains(&"admin@example.com".to_string()));
    assert!(emails.contains(&"member@example.com".to_string()));
    assert!(!emails.contains(&"root@example.com".to_string()));
}

/// Reads one column back out of an exported Users sheet.
async fn exported_column(response: axum::response::Response, column: &str) -> Vec<String> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut workbook = Xlsx::new(Cursor::new(bytes.to_vec())).unwrap();
    let range = workbook.worksheet_range("Users").unwrap();
    let mut rows = range.rows();
    let header = rows.next().unwrap();
    let col = header
        .iter()
        .position(|c| c.to_string() == column)
        .unwrap();
    rows.map(|row| row[col].to_string()).collect()
}

async fn exported_emails(response: axum::response::Response) -> Vec<String> {
    exported_column(response, "Email").await
}

#[tokio::test]
async fn sensitive_user_export_is_gated_and_explicit() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;
    let admin = seed_user(&pool, "Admin", "admin@example.com", Role::Admin).await;
    seed_user(&pool, "Member", "member@example.com", Role::Member).await;

    // Default export never carries password material.
    let response = app
        .clone()
        .oneshot(get_request("/api/reports/export/users", &bearer(&root)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let passwords = exported_column(response, "Password").await;
    assert!(passwords.iter().all(String::is_empty));

    // Only the super admin may opt in.
    let response = app
        .clone()
        .oneshot(get_request(
            "/api/reports/export/users?includeSensitive=true",
            &bearer(&admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Opted-in export carries the stored hashes verbatim.
    let response = app
        .clone()
        .oneshot(get_request(
            "/api/reports/export/users?includeSensitive=true",
            &bearer(&root),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let passwords = exported_column(response, "Password").await;
    assert!(!passwords.is_empty());
    assert!(passwords.iter().all(|p| p.starts_with("$argon2")));
}

#[tokio::test]
async fn updating_to_a_taken_email_is_a_validation_error() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;
    let member = seed_user(&pool, "Member", "member@example.com", Role::Member).await;
    seed_user(&pool, "Other", "other@example.com", Role::Member).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{}", member.id),
            Some(&bearer(&root)),
            json!({"email": "Other@Example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Re-submitting the user's own email is not a collision.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/users/{}", member.id),
            Some(&bearer(&root)),
            json!({"email": "member@example.com", "name": "Renamed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Profile self-update is gated the same way.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/auth/profile",
            Some(&bearer(&member)),
            json!({"email": "other@example.com"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn task_listing_is_scoped_with_summary_over_visible_set() {
    let (app, pool) = setup().await;
    let admin = seed_user(&pool, "Admin", "admin@example.com", Role::Admin).await;
    let other_admin = seed_user(&pool, "Other", "other@example.com", Role::Admin).await;
    let member = seed_user(&pool, "Member", "member@example.com", Role::Member).await;

    for (title, creator, assignee) in [
        ("Mine", &admin, &member),
        ("Theirs for member", &other_admin, &member),
        ("Theirs private", &other_admin, &other_admin),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tasks/",
                Some(&bearer(creator)),
                json!({
                    "title": title,
                    "description": "",
                    "priority": "medium",
                    "dueDate": "2027-06-01",
                    "assignedTo": [assignee.id],
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Admin sees own tasks plus member-assigned ones, not the other
    // admin's private task.
    let response = app
        .clone()
        .oneshot(get_request("/api/tasks/", &bearer(&admin)))
        .await
        .unwrap();
    let body: Value = response_json(response).await;
    assert_eq!(body["statusSummary"]["totalTasks"], 2);

    // A status filter narrows rows but not the summary.
    let response = app
        .clone()
        .oneshot(get_request("/api/tasks/?status=completed", &bearer(&admin)))
        .await
        .unwrap();
    let body: Value = response_json(response).await;
    assert_eq!(body["tasks"].as_array().unwrap().len(), 0);
    assert_eq!(body["statusSummary"]["totalTasks"], 2);

    // Member sees only assigned tasks.
    let response = app
        .clone()
        .oneshot(get_request("/api/tasks/", &bearer(&member)))
        .await
        .unwrap();
    let body: Value = response_json(response).await;
    assert_eq!(body["statusSummary"]["totalTasks"], 2);
    let titles: Vec<&str> = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert!(!titles.contains(&"Theirs private"));
}

#[tokio::test]
async fn only_super_admin_deletes_tasks() {
    let (app, pool) = setup().await;
    let root = seed_user(&pool, "Root", "root@example.com", Role::SuperAdmin).await;
    let admin = seed_user(&pool, "Admin", "admin@example.com", Role::Admin).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/tasks/",
            Some(&bearer(&admin)),
            json!({
                "title": "Ephemeral",
                "description": "",
                "priority": "low",
                "dueDate": "2027-06-01",
                "assignedTo": [admin.id],
            }),
        ))
        .await
        .unwrap();
    let task: Value = response_json(response).await;
    let task_id = task["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tasks/{task_id}"))
                .header(header::AUTHORIZATION, bearer(&admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/tasks/{task_id}"))
                .header(header::AUTHORIZATION, bearer(&root))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
