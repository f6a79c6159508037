use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct DailyStat {
    walk_min: f64,
    meal_count: f64,
}

#[derive(Debug, Deserialize)]
struct TodayResponse {
    date: String,
    stat: DailyStat,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    signed_in: bool,
    user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeStat {
    period: String,
    days: Vec<DailyStat>,
}

#[derive(Debug, Deserialize)]
struct Activity {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    amount: f64,
    unit: String,
}

#[derive(Debug, Deserialize)]
struct ExtractedActivity {
    #[serde(rename = "type")]
    kind: String,
    amount: f64,
    unit: String,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::Once;
    use std::sync::atomic::{AtomicI32, Ordering};

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_temp_path(label: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("pet_time_http_{}_{}_{label}", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/auth/session")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_pet_time"))
        .env("PORT", port.to_string())
        .env("APP_DATA_PATH", unique_temp_path("backend.json"))
        .env("APP_SESSION_PATH", unique_temp_path("session.json"))
        .env("APP_OBJECTS_DIR", unique_temp_path("objects"))
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

/// One server per test binary, signed in once with a fresh account.
async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);

    let session: SessionResponse = Client::new()
        .post(format!("{}/api/auth/signup", server.base_url))
        .json(&serde_json::json!({ "email": "owner@example.com", "password": "secret-pw" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.signed_in);
    assert_eq!(session.user_email.as_deref(), Some("owner@example.com"));

    *guard = Some(Arc::clone(&server));
    server
}

async fn today(client: &Client, base_url: &str) -> TodayResponse {
    client
        .get(format!("{base_url}/api/today"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_logged_walk_updates_today() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = today(&client, &server.base_url).await;

    let response = client
        .post(format!("{}/api/activities", server.base_url))
        .json(&serde_json::json!({ "type": "walk", "amount": 25, "unit": "min" }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let activity: Activity = response.json().await.unwrap();
    assert_eq!(activity.kind, "walk");
    assert_eq!(activity.unit, "min");

    let after = today(&client, &server.base_url).await;
    assert_eq!(after.stat.walk_min, before.stat.walk_min + 25.0);
    assert!(!after.date.is_empty());
}

#[tokio::test]
async fn http_invalid_amount_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before: Vec<Activity> = client
        .get(format!("{}/api/activities", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/activities", server.base_url))
        .json(&serde_json::json!({ "type": "meal", "amount": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let after: Vec<Activity> = client
        .get(format!("{}/api/activities", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        after.iter().map(|a| a.id).collect::<Vec<_>>(),
        before.iter().map(|a| a.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn http_quick_meal_counts_once() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let before = today(&client, &server.base_url).await;
    let response = client
        .post(format!("{}/api/quick/meal", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "logged");

    let after = today(&client, &server.base_url).await;
    assert_eq!(after.stat.meal_count, before.stat.meal_count + 1.0);
}

#[tokio::test]
async fn http_month_stats_span_thirty_days() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let range: RangeStat = client
        .get(format!("{}/api/stats?period=month", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(range.period, "month");
    assert_eq!(range.days.len(), 30);
}

#[tokio::test]
async fn http_extract_reads_free_text() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let extracted: Vec<ExtractedActivity> = client
        .post(format!("{}/api/extract", server.base_url))
        .json(&serde_json::json!({ "text": "散歩 30分、おやつ 2回" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(extracted.len(), 2);
    assert_eq!(extracted[0].kind, "walk");
    assert_eq!(extracted[0].amount, 30.0);
    assert_eq!(extracted[0].unit, "min");
    assert_eq!(extracted[1].kind, "treat");
    assert_eq!(extracted[1].amount, 2.0);
    assert_eq!(extracted[1].unit, "count");
}

#[tokio::test]
async fn http_unknown_pet_is_not_found() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .post(format!("{}/api/pets/987654/select", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
