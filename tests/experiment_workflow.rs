use gesture_lab::config::AppConfig;
use gesture_lab::MemoryStore;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
    session_cookie: Option<String>,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            session_cookie: None,
        }
    }

    fn with_session(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.session_cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.with_session(self.client.post(format!("{}{}", self.base_url, path)))
            .json(&json)
            .send()
            .await
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.with_session(self.client.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
    }

    /// Keeps the `name=value` part of a Set-Cookie header for later requests
    fn remember_session(&mut self, response: &reqwest::Response) {
        self.session_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|pair| pair.to_string());
    }
}

/// Starts the server on an ephemeral port backed by an in-memory store
async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let config = AppConfig::default();

    tokio::spawn(async move {
        gesture_lab::serve(listener, MemoryStore::new(), &config)
            .await
            .unwrap();
    });

    format!("http://{}", address)
}

#[tokio::test]
async fn test_researcher_and_subject_workflow() {
    let mut client = TestClient::new(spawn_server().await);

    // 1. Creating an experiment without logging in is refused
    let response = client
        .post("/create_experiment", json!({"name": "Early", "blocks": []}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // 2. Register a researcher; the response logs them in
    let response = client
        .post(
            "/register",
            json!({
                "username": "lab.manager",
                "email": "lab@example.edu",
                "password1": "motor-skill-2021",
                "password2": "motor-skill-2021"
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    client.remember_session(&response);
    assert!(client.session_cookie.is_some());

    // 3. Define an experiment with two blocks
    let response = client
        .post(
            "/create_experiment",
            json!({
                "name": "Tapping study",
                "blocks": [
                    {"sequence": "41324", "max_time_per_trial": 5, "resting_time": 20,
                     "block_type": "training", "max_time": 90, "num_trials": 2},
                    {"sequence": 23142, "max_time_per_trial": 5, "resting_time": 0,
                     "block_type": "test", "max_time": 60, "num_trials": 1}
                ]
            }),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let code = created["experiment"]["id"].as_i64().unwrap();
    assert_eq!(created["blocks"][1]["sequence"], "23142");

    // 4. A subject loads the experiment by code
    let subject = TestClient::new(client.base_url.clone());
    let response = subject.get(&format!("/experiment?code={}", code)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let loaded: Value = response.json().await.unwrap();
    assert_eq!(loaded["blocks"].as_array().unwrap().len(), 2);

    // 5. ...and submits the collected trials
    let trials = json!([
        [
            {"started_at": 1700000000000i64, "keypresses": [
                {"value": "4", "timestamp": 1700000000300i64},
                {"value": "1", "timestamp": 1700000000620i64}
            ]},
            {"started_at": 1700000005000i64, "keypresses": [
                {"value": "4", "timestamp": 1700000005280i64}
            ]}
        ],
        [
            {"started_at": 1700000030000i64, "keypresses": []}
        ]
    ]);
    let response = subject
        .post(
            "/create_trials",
            json!({"experiment": code.to_string(), "experiment_trials": trials.to_string()}),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary: Value = response.json().await.unwrap();
    assert_eq!(summary["trials"], 3);
    assert_eq!(summary["keypresses"], 3);

    // 6. Unknown codes are not found
    let response = subject
        .post("/create_trials", json!({"experiment": 424242, "experiment_trials": "[]"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // 7. The researcher exports what was recorded
    let response = client.get(&format!("/experiments/{}/trials", code)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let export: Value = response.json().await.unwrap();
    assert_eq!(export["total"], 3);
    assert_eq!(export["items"][0]["keypresses"].as_array().unwrap().len(), 2);
    assert_eq!(export["items"][0]["started_at"], "2023-11-14T22:13:20Z");

    // 8. The profile lists the experiment
    let response = client.get("/profile").await.unwrap();
    let profile: Value = response.json().await.unwrap();
    assert_eq!(profile["user"]["email"], "lab@example.edu");
    assert_eq!(profile["experiments"][0]["id"], code);
}
