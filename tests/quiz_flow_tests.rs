// tests/quiz_flow_tests.rs
//
// End-to-end quiz grading flow: scoring, the two-attempt budget, chapter
// unlocking and the no-downgrade rule. Runs as one sequential scenario
// because it owns the whole catalog (the tables are truncated first).

use academy::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> Option<(String, PgPool)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        port: 0,
        admin_email: None,
        admin_password: None,
        grader_api_url: None,
        grader_api_key: None,
    };

    let state = AppState::new(pool.clone(), config);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Some((address, pool))
}

async fn reset_database(pool: &PgPool) {
    sqlx::query(
        "TRUNCATE user_progress, quiz_attempts, questions, chapters, modules, messages, users RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .expect("Failed to truncate test database");
}

async fn seed_module(pool: &PgPool, slug: &str, position: i32) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO modules (slug, title, position) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(slug)
    .bind(format!("Module {}", slug))
    .bind(position)
    .fetch_one(pool)
    .await
    .expect("Failed to seed module")
}

async fn seed_chapter(pool: &PgPool, module_id: i64, order_index: i32) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO chapters (module_id, title, content, order_index)
         VALUES ($1, $2, 'Chapter body', $3) RETURNING id",
    )
    .bind(module_id)
    .bind(format!("Chapter {}", order_index))
    .bind(order_index)
    .fetch_one(pool)
    .await
    .expect("Failed to seed chapter")
}

async fn seed_question(pool: &PgPool, chapter_id: i64, correct_index: i32) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO questions (chapter_id, prompt, options, correct_index, explanation)
         VALUES ($1, 'Pick the right one', $2, $3, 'Because it is.') RETURNING id",
    )
    .bind(chapter_id)
    .bind(serde_json::json!(["A", "B", "C", "D"]))
    .bind(correct_index)
    .fetch_one(pool)
    .await
    .expect("Failed to seed question")
}

async fn register_and_login(client: &reqwest::Client, address: &str, email: &str) -> String {
    client
        .post(&format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "email": email,
            "password": "password123",
            "full_name": "Quiz Tester"
        }))
        .send()
        .await
        .expect("Register failed");

    let login_resp = client
        .post(&format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "email": email,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    login_resp["token"]
        .as_str()
        .expect("Token not found")
        .to_string()
}

#[tokio::test]
async fn quiz_grading_flow() {
    let Some((address, pool)) = spawn_app().await else {
        return;
    };
    let client = reqwest::Client::new();

    reset_database(&pool).await;

    // One module, two chapters, four questions on the first chapter.
    // The correct answer is always option 0.
    let module_id = seed_module(&pool, "fundamentals", 0).await;
    let chapter_1 = seed_chapter(&pool, module_id, 1).await;
    let chapter_2 = seed_chapter(&pool, module_id, 2).await;
    let mut question_ids = Vec::new();
    for _ in 0..4 {
        question_ids.push(seed_question(&pool, chapter_1, 0).await);
    }

    let token = register_and_login(&client, &address, "quiz_student@example.com").await;

    // The chapter payload must not leak answers.
    let chapter_resp = client
        .get(&format!("{}/api/chapters/{}", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .expect("Fetch chapter failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse chapter json");
    let questions = chapter_resp["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 4);
    assert!(questions[0].get("correct_index").is_none());
    assert!(questions[0].get("explanation").is_none());

    // Incomplete answer sets are rejected before any write.
    let mut partial = serde_json::Map::new();
    for id in question_ids.iter().take(3) {
        partial.insert(id.to_string(), serde_json::json!(0));
    }
    let incomplete = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": partial }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(incomplete.status().as_u16(), 400);

    let all_wrong: serde_json::Map<String, serde_json::Value> = question_ids
        .iter()
        .map(|id| (id.to_string(), serde_json::json!(3)))
        .collect();

    // Attempt 1: fail.
    let first = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": all_wrong }))
        .send()
        .await
        .expect("Submit failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse submit json");
    assert_eq!(first["score"], 0);
    assert_eq!(first["passed"], false);
    assert_eq!(first["attempts_remaining"], 1);

    // Attempt 2: fail again, budget spent.
    let second = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": all_wrong }))
        .send()
        .await
        .expect("Submit failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse submit json");
    assert_eq!(second["attempts_remaining"], 0);

    // Attempt 3: rejected until an administrative reset.
    let third = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "answers": all_wrong }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(third.status().as_u16(), 409);

    // The attempt log is append-only and strictly numbered.
    let attempt_numbers: Vec<i32> = sqlx::query_scalar(
        "SELECT attempt_number FROM quiz_attempts
         WHERE chapter_id = $1 ORDER BY attempt_number",
    )
    .bind(chapter_1)
    .fetch_all(&pool)
    .await
    .expect("Failed to read attempts");
    assert_eq!(attempt_numbers, vec![1, 2]);

    // A second student answers 3 of 4 correctly: 75 >= 75 passes and the
    // next chapter of the module unlocks.
    let token_2 = register_and_login(&client, &address, "quiz_student2@example.com").await;

    let mut three_right: serde_json::Map<String, serde_json::Value> = question_ids
        .iter()
        .map(|id| (id.to_string(), serde_json::json!(0)))
        .collect();
    three_right.insert(question_ids[3].to_string(), serde_json::json!(2));

    let pass = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token_2))
        .json(&serde_json::json!({ "answers": three_right }))
        .send()
        .await
        .expect("Submit failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse submit json");
    assert_eq!(pass["score"], 75);
    assert_eq!(pass["passed"], true);
    assert_eq!(pass["correct_count"], 3);

    let progress = client
        .get(&format!("{}/api/progress/me", address))
        .header("Authorization", format!("Bearer {}", token_2))
        .send()
        .await
        .expect("Fetch progress failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse progress json");

    let records = progress["records"].as_array().expect("records");
    let completed_record = records
        .iter()
        .find(|r| r["chapter_id"] == chapter_1)
        .expect("chapter 1 record");
    assert_eq!(completed_record["completed"], true);
    assert_eq!(completed_record["score"], 75);

    let unlocked_record = records
        .iter()
        .find(|r| r["chapter_id"] == chapter_2)
        .expect("chapter 2 record");
    assert!(unlocked_record["unlocked_at"].as_str().is_some());

    // Resubmitting a completed chapter is accepted idempotently and never
    // downgrades the stored result.
    let downgrade_try = client
        .post(&format!("{}/api/quiz/{}/submit", address, chapter_1))
        .header("Authorization", format!("Bearer {}", token_2))
        .json(&serde_json::json!({ "answers": all_wrong }))
        .send()
        .await
        .expect("Submit failed");
    assert_eq!(downgrade_try.status().as_u16(), 200);

    let (still_completed, kept_score): (bool, Option<i32>) = sqlx::query_as(
        "SELECT completed, score FROM user_progress
         WHERE chapter_id = $1 AND user_id = (SELECT id FROM users WHERE email = 'quiz_student2@example.com')",
    )
    .bind(chapter_1)
    .fetch_one(&pool)
    .await
    .expect("Failed to read progress row");
    assert!(still_completed);
    assert_eq!(kept_score, Some(75));
}
