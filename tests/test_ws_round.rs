mod common;

use serde_json::json;

use common::{DEFAULT_TIMEOUT, ROUND_TIMEOUT, TestServer, fast_config};

#[tokio::test]
async fn new_connection_receives_state_then_players_then_bets() {
    let server = TestServer::start(fast_config()).await;
    let mut client = server.connect().await;

    let state = client.handshake().await;
    assert_eq!(state["data"]["phase"], "idle");
    assert_eq!(state["data"]["strategy"], "attrition");

    client.close().await;
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn bet_before_round_is_refused_privately() {
    let server = TestServer::start(fast_config()).await;
    let mut client = server.connect().await;
    client.handshake().await;

    client
        .send_event("place_bet", json!({ "side": "gold", "amount": 10 }))
        .await;
    let error = client.expect_event("error", DEFAULT_TIMEOUT).await;
    assert_eq!(error["data"]["code"], "betting_closed");
    assert_eq!(error["data"]["message"], "Betting is closed");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_frames_get_error_replies() {
    let server = TestServer::start(fast_config()).await;
    let mut client = server.connect().await;
    client.handshake().await;

    client.send_text("{not json").await;
    let error = client.expect_event("error", DEFAULT_TIMEOUT).await;
    assert_eq!(error["data"]["message"], "Invalid JSON");

    client.send_event("launch", json!({})).await;
    let error = client.expect_event("error", DEFAULT_TIMEOUT).await;
    assert_eq!(error["data"]["code"], "unknown_event");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn identify_renames_and_resends_state() {
    let server = TestServer::start(fast_config()).await;
    let mut client = server.connect().await;
    client.handshake().await;

    client.send_event("identify", json!({ "name": "  ann  " })).await;
    let players = client.expect_event("player_list", DEFAULT_TIMEOUT).await;
    let names: Vec<&str> = players["data"]["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ann"]);
    client.expect_event("game_state", DEFAULT_TIMEOUT).await;

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn full_round_settles_winning_bet() {
    let server = TestServer::start(fast_config()).await;
    let mut bettor = server.connect().await;
    bettor.handshake().await;

    bettor.send_event("start_round", json!({})).await;
    let created = bettor.expect_event("round_created", DEFAULT_TIMEOUT).await;
    let round_id = created["data"]["round_id"].clone();
    let open = bettor.expect_event("betting_open", DEFAULT_TIMEOUT).await;
    assert_eq!(open["data"]["round_id"], round_id);
    assert_eq!(open["data"]["countdown"], 1);

    bettor
        .send_event("place_bet", json!({ "side": "Gold", "amount": 50 }))
        .await;
    let accepted = bettor.expect_event("bet_accepted", DEFAULT_TIMEOUT).await;
    assert_eq!(accepted["data"]["side"], "gold");
    assert_eq!(accepted["data"]["balance"], 450.0);

    bettor
        .send_event("place_bet", json!({ "side": "gold", "amount": 5 }))
        .await;
    let duplicate = bettor.expect_event("error", DEFAULT_TIMEOUT).await;
    assert_eq!(duplicate["data"]["code"], "duplicate_bet");

    bettor.expect_event("betting_closed", DEFAULT_TIMEOUT).await;
    bettor.expect_event("battle_start", DEFAULT_TIMEOUT).await;
    let result = bettor.expect_event("round_result", ROUND_TIMEOUT).await;
    assert_eq!(result["data"]["round_id"], round_id);
    assert_eq!(result["data"]["totals"]["gold"], 50.0);

    let settlement = result["data"]["settlement"].as_object().unwrap();
    assert_eq!(settlement.len(), 1);
    let entry = settlement.values().next().unwrap();
    let change = entry["change"].as_f64().unwrap();
    if result["data"]["winner"] == "gold" {
        assert!(change >= 50.0, "winning bet should at least return its stake");
        assert_eq!(entry["balance"].as_f64().unwrap(), 450.0 + change);
    } else {
        assert_eq!(change, 0.0);
        assert_eq!(entry["balance"], 450.0);
    }

    // A second start after the result opens a fresh round.
    bettor.send_event("start_game", json!({})).await;
    let next = bettor.expect_event("round_created", DEFAULT_TIMEOUT).await;
    assert_ne!(next["data"]["round_id"], round_id);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn start_round_mid_round_is_refused() {
    let mut config = fast_config();
    config.round.betting_seconds = 30;
    let server = TestServer::start(config).await;
    let mut client = server.connect().await;
    client.handshake().await;

    client.send_event("start_round", json!({})).await;
    client.expect_event("betting_open", DEFAULT_TIMEOUT).await;
    client.send_event("start_round", json!({})).await;
    let error = client.expect_event("error", DEFAULT_TIMEOUT).await;
    assert_eq!(error["data"]["code"], "round_in_progress");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn broadcasts_reach_every_participant() {
    let server = TestServer::start(fast_config()).await;
    let mut a = server.connect().await;
    a.handshake().await;
    let mut b = server.connect().await;
    b.handshake().await;

    a.send_event("start_round", json!({})).await;
    let seen_by_a = a.expect_event("round_created", DEFAULT_TIMEOUT).await;
    let seen_by_b = b.expect_event("round_created", DEFAULT_TIMEOUT).await;
    assert_eq!(seen_by_a["data"]["round_id"], seen_by_b["data"]["round_id"]);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_endpoint_reports_connections() {
    let server = TestServer::start(fast_config()).await;
    let mut client = server.connect().await;
    client.handshake().await;

    let body = http_get(server.addr, "/health").await;
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["connections"], 1);

    server.shutdown().await.unwrap();
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    body.to_string()
}
