use futures::{SinkExt, StreamExt};
use quiz_runner::config::Config;
use quiz_runner::{build_state, routes::build_router};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

async fn spawn_server() -> (String, reqwest::Client) {
    let state = build_state(&Config::default()).expect("state");
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), reqwest::Client::new())
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (u16, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json::<Value>().await.unwrap())
}

async fn load_sample_and_start(base: &str, client: &reqwest::Client) {
    let (status, _) = post(client, format!("{}/api/v1/bank/sample", base), json!({})).await;
    assert_eq!(status, 200);
    let (status, body) = post(client, format!("{}/api/v1/quiz/start", base), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["phase"], "active");
}

#[tokio::test]
async fn sample_practice_flow_updates_stats() {
    let (base, client) = spawn_server().await;
    load_sample_and_start(&base, &client).await;

    let (status, body) = post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "a"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["committed"]["isCorrect"], true);
    assert_eq!(body["state"]["stats"]["correct"], 1);
    assert_eq!(body["state"]["question"]["overlay"]["isCorrect"], true);

    let (status, body) = post(&client, format!("{}/api/v1/quiz/nav/next", base), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["advance"], "moved");
    assert_eq!(body["state"]["index"], 1);

    let (_, body) = post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "B"})).await;
    assert_eq!(body["state"]["stats"]["incorrect"], 1);
    assert_eq!(body["state"]["stats"]["totalAttempted"], 2);
    assert_eq!(body["state"]["stats"]["accuracyPct"], 50);

    let state = client
        .get(format!("{}/api/v1/state", base))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(state["total"], 3);
    assert_eq!(state["stats"]["totalAttempted"], 2);
}

#[tokio::test]
async fn upload_reports_rejected_lines_and_refuses_bad_bytes() {
    let (base, client) = spawn_server().await;

    let text = "Largest planet?|Mars|Jupiter|Venus|Earth|B|Gas giant\nnot a question\nPrimes?,2,4,5,9,A,C\n";
    let resp = client
        .post(format!("{}/api/v1/bank", base))
        .body(text)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["result"]["loaded"], 2);
    assert_eq!(body["result"]["rejected"][0]["line"], 2);
    assert_eq!(body["result"]["rejected"][0]["reason"]["kind"], "tooFewFields");
    assert_eq!(body["state"]["phase"], "uploading");

    let resp = client
        .post(format!("{}/api/v1/bank", base))
        .body(vec![0x51u8, 0xff, 0xfe, 0x7c])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["error"]["code"], "UNDECODABLE_INPUT");

    // The earlier bank is still in place.
    let (status, body) = post(&client, format!("{}/api/v1/quiz/start", base), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["total"], 2);
}

#[tokio::test]
async fn commands_before_loading_are_refused() {
    let (base, client) = spawn_server().await;
    let (status, body) = post(&client, format!("{}/api/v1/quiz/start", base), json!({})).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "EMPTY_BANK");

    let resp = client
        .post(format!("{}/api/v1/bank", base))
        .body("only|three|fields\n")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_mode_locks_answered_questions() {
    let (base, client) = spawn_server().await;
    load_sample_and_start(&base, &client).await;

    let (status, body) = post(&client, format!("{}/api/v1/quiz/mode", base), json!({"mode": "test"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["settings"]["mode"], "test");

    let (status, body) = post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "B"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["committed"]["isCorrect"], false);
    assert_eq!(body["state"]["question"]["overlay"], Value::Null);

    let (status, body) = post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "A"})).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "LOCKED_ANSWER");

    let (status, body) = post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "E"})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"][0]["field"], "letter");
}

#[tokio::test]
async fn jump_and_reset_validation() {
    let (base, client) = spawn_server().await;
    load_sample_and_start(&base, &client).await;

    let (status, body) = post(&client, format!("{}/api/v1/quiz/jump", base), json!({"index": 7})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "INDEX_OUT_OF_RANGE");

    let (status, body) = post(&client, format!("{}/api/v1/quiz/jump", base), json!({"index": 2})).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["nav"]["last"], false);

    post(&client, format!("{}/api/v1/quiz/select", base), json!({"letter": "C"})).await;

    let (status, body) = post(&client, format!("{}/api/v1/quiz/reset", base), json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");

    let (status, body) = post(&client, format!("{}/api/v1/quiz/reset", base), json!({"confirm": true})).await;
    assert_eq!(status, 200);
    assert_eq!(body["state"]["stats"]["totalAttempted"], 0);

    let resp = client
        .put(format!("{}/api/v1/settings", base))
        .json(&json!({"theme": "dark", "fontSize": "large"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["state"]["settings"]["theme"], "dark");
    assert_eq!(body["state"]["settings"]["fontSize"], "large");
}

async fn next_state(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    matches: impl Fn(&Value) -> bool,
) -> Value {
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("state update in time")
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else { continue };
        let env: Value = serde_json::from_str(&text).unwrap();
        if env["event"] == "state_update" && matches(&env["payload"]) {
            return env["payload"].clone();
        }
    }
}

#[tokio::test]
async fn ws_pushes_state_and_accepts_keys() {
    let (base, client) = spawn_server().await;
    let ws_url = base.replace("http://", "ws://");
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}/ws", ws_url))
        .await
        .unwrap();

    let initial = next_state(&mut ws, |_| true).await;
    assert_eq!(initial["phase"], "uploading");

    load_sample_and_start(&base, &client).await;
    next_state(&mut ws, |p| p["phase"] == "active").await;

    ws.send(Message::Text(
        json!({"event": "key", "payload": {"key": "a"}}).to_string(),
    ))
    .await
    .unwrap();
    let answered = next_state(&mut ws, |p| p["stats"]["correct"] == 1).await;
    assert_eq!(answered["question"]["answered"], true);

    ws.send(Message::Text(
        json!({"event": "key", "payload": {"key": "ArrowRight"}}).to_string(),
    ))
    .await
    .unwrap();
    let moved = next_state(&mut ws, |p| p["index"] == 1).await;
    assert_eq!(moved["nav"]["prev"], true);
}

#[tokio::test]
async fn refused_ws_key_is_answered_to_its_sender_only() {
    let (base, client) = spawn_server().await;
    let ws_url = format!("{}/ws", base.replace("http://", "ws://"));
    let (mut sender, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (mut bystander, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    next_state(&mut sender, |_| true).await;
    next_state(&mut bystander, |_| true).await;

    // Nothing is loaded yet, so selecting is refused.
    sender
        .send(Message::Text(
            json!({"event": "key", "payload": {"key": "a"}, "request_id": "k1"}).to_string(),
        ))
        .await
        .unwrap();
    let reply = loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), sender.next())
            .await
            .expect("error reply in time")
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else { continue };
        let env: Value = serde_json::from_str(&text).unwrap();
        if env["event"] == "error" {
            break env;
        }
    };
    assert_eq!(reply["request_id"], "k1");
    assert_eq!(reply["payload"]["message"], "no questions are loaded");

    // Everything the bystander receives before this load would include a
    // leaked error.
    let (status, _) = post(&client, format!("{}/api/v1/bank/sample", base), json!({})).await;
    assert_eq!(status, 200);
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), bystander.next())
            .await
            .expect("state update in time")
            .unwrap()
            .unwrap();
        let Message::Text(text) = msg else { continue };
        let env: Value = serde_json::from_str(&text).unwrap();
        assert_ne!(env["event"], "error");
        if env["event"] == "state_update" && env["payload"]["total"] == 3 {
            break;
        }
    }
}
