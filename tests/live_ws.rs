use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use skycoach::gemini::BidiGenerateContentSetup;
use skycoach::live::{self, EncodedChunk, LiveEvent, LiveTransport};
use skycoach::{AssistantClient, AssistantConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

async fn next_json(ws: &mut ServerWs) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/live?key=test", listener.local_addr().unwrap());
    (listener, url)
}

fn setup() -> BidiGenerateContentSetup {
    BidiGenerateContentSetup {
        model: "models/test-live".to_string(),
        ..Default::default()
    }
}

async fn drain(events: &mut UnboundedReceiver<LiveEvent>) -> Vec<LiveEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        let done = matches!(event, LiveEvent::Close(_));
        seen.push(event);
        if done {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_session_round_trip() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let setup = next_json(&mut ws).await;
        assert_eq!(setup["setup"]["model"], "models/test-live");
        ws.send(Message::text(r#"{"setupComplete":{}}"#)).await.unwrap();

        let mut uplink = Vec::new();
        for _ in 0..3 {
            uplink.push(next_json(&mut ws).await);
        }

        let audio = json!({"serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAABAA=="}}
        ]}}});
        ws.send(Message::text(audio.to_string())).await.unwrap();
        ws.send(Message::text(r#"{"serverContent":{"interrupted":true}}"#)).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
        uplink
    });

    let link = live::open(url, setup());
    let mut events = link.events;

    // queued before the session is open; must still go out first
    link.transport.send_realtime_input(EncodedChunk::pcm16k(&[1, 0])).unwrap();
    assert!(matches!(events.recv().await, Some(LiveEvent::Open)));
    link.transport.send_realtime_input(EncodedChunk::pcm16k(&[2, 0])).unwrap();
    link.transport.send_realtime_input(EncodedChunk::pcm16k(&[3, 0])).unwrap();

    match events.recv().await {
        Some(LiveEvent::Message(msg)) => assert_eq!(msg.inline_audio(), Some("AAABAA==")),
        other => panic!("expected audio, got {:?}", other),
    }
    match events.recv().await {
        Some(LiveEvent::Message(msg)) => assert!(msg.is_interrupted()),
        other => panic!("expected interruption, got {:?}", other),
    }

    link.transport.close();
    link.transport.close();
    let rest = drain(&mut events).await;
    assert!(matches!(rest.last(), Some(LiveEvent::Close(None))));

    let uplink = server.await.unwrap();
    let data: Vec<&str> = uplink
        .iter()
        .map(|m| m["realtimeInput"]["audio"]["data"].as_str().unwrap())
        .collect();
    assert_eq!(data, vec!["AQA=", "AgA=", "AwA="]);
    assert!(uplink
        .iter()
        .all(|m| m["realtimeInput"]["audio"]["mimeType"] == "audio/pcm;rate=16000"));
}

#[tokio::test]
async fn test_bad_frame_reports_error_and_keeps_socket() {
    let (listener, url) = listen().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _setup = next_json(&mut ws).await;
        ws.send(Message::text(r#"{"setupComplete":{}}"#)).await.unwrap();
        ws.send(Message::text("not json")).await.unwrap();
        ws.send(Message::text(r#"{"serverContent":{"interrupted":true}}"#)).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    });

    let mut link = live::open(url, setup());
    assert!(matches!(link.events.recv().await, Some(LiveEvent::Open)));
    assert!(matches!(link.events.recv().await, Some(LiveEvent::Error(_))));
    match link.events.recv().await {
        Some(LiveEvent::Message(msg)) => assert!(msg.is_interrupted()),
        other => panic!("expected a message after the bad frame, got {:?}", other),
    }

    link.transport.close();
    let rest = drain(&mut link.events).await;
    assert!(matches!(rest.last(), Some(LiveEvent::Close(None))));
}

#[tokio::test]
async fn test_rejected_during_setup() {
    let (listener, url) = listen().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _setup = next_json(&mut ws).await;
        ws.close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: "API key not valid".into(),
        }))
        .await
        .unwrap();
        while ws.next().await.is_some() {}
    });

    let mut link = live::open(url, setup());
    let events = drain(&mut link.events).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        LiveEvent::Close(Some(reason)) => assert_eq!(reason, "API key not valid"),
        other => panic!("expected close with reason, got {:?}", other),
    }
    assert!(link.transport.send_realtime_input(EncodedChunk::pcm16k(&[0, 0])).is_err());
}

#[tokio::test]
async fn test_connect_failure_reports_error_then_close() {
    let (listener, url) = listen().await;
    drop(listener);

    let mut link = live::open(url, setup());
    let events = drain(&mut link.events).await;

    assert!(matches!(events[0], LiveEvent::Error(_)));
    assert!(matches!(events[1], LiveEvent::Close(None)));
}

#[tokio::test]
async fn test_client_connects_with_coaching_setup() {
    use skycoach::live::LiveConnector;

    let (listener, url) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let setup = next_json(&mut ws).await;
        ws.send(Message::text(r#"{"setupComplete":{}}"#)).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
        setup
    });

    let mut config = AssistantConfig::with_api_key("secret");
    config.live_url = url.split('?').next().unwrap().to_string();
    let client = AssistantClient::new(config).unwrap();

    let mut link = client.connect_live().unwrap();
    assert!(matches!(link.events.recv().await, Some(LiveEvent::Open)));
    link.transport.close();

    let setup = server.await.unwrap();
    assert_eq!(
        setup["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Zephyr"
    );
    assert!(setup["setup"]["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .contains("DGCA"));
}
