use ephemail::{app::AppState, bus::EventBus, config::Config, db, http, smtp, store::MailStore};
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    task::JoinHandle,
};
use tokio_stream::StreamExt;

struct TestServer {
    http_base: String,
    smtp_addr: std::net::SocketAddr,
    _http_task: JoinHandle<()>,
    _smtp_task: JoinHandle<()>,
}

fn test_config() -> Config {
    Config {
        http_addr: "127.0.0.1:0".to_string(),
        smtp_addr: "127.0.0.1:0".to_string(),
        database_url: "sqlite://:memory:".to_string(),
        email_domain: "example.test".to_string(),
        retention_minutes: 60,
        sweep_interval: Duration::from_secs(300),
    }
}

async fn start_server() -> TestServer {
    let db_url = db::ensure_sqlite_path("sqlite://:memory:");
    let pool = SqlitePoolOptions::new()
        // a single connection keeps every query on the same in-memory database
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("connect memory sqlite");
    db::run_migrations(&pool).await.expect("migrate");

    let state = AppState {
        store: MailStore::new(pool),
        bus: EventBus::new(),
        config: test_config(),
    };

    let smtp_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let smtp_addr = smtp_listener.local_addr().unwrap();
    let smtp_state = state.clone();
    let smtp_task = tokio::spawn(async move {
        smtp::serve(smtp_listener, smtp_state).await.unwrap();
    });

    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    let app = http::build_router(state);
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, app).await.unwrap();
    });

    TestServer {
        http_base: format!("http://{}", http_addr),
        smtp_addr,
        _http_task: http_task,
        _smtp_task: smtp_task,
    }
}

struct SmtpSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpSession {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect smtp");
        let (read, writer) = stream.into_split();
        let mut session = SmtpSession {
            reader: BufReader::new(read),
            writer,
        };
        let greeting = session.read_reply().await;
        assert!(greeting.starts_with("220"), "greeting: {greeting}");
        session
    }

    /// Read one reply, skipping `250-` style continuation lines.
    async fn read_reply(&mut self) -> String {
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.expect("read reply");
            assert!(!line.is_empty(), "server closed connection");
            if line.as_bytes().get(3) == Some(&b'-') {
                continue;
            }
            return line;
        }
    }

    async fn command(&mut self, cmd: &str) -> String {
        self.writer
            .write_all(format!("{cmd}\r\n").as_bytes())
            .await
            .expect("write command");
        self.read_reply().await
    }

    /// Drive a full MAIL/RCPT/DATA exchange and return the final reply.
    async fn send_mail(&mut self, from: &str, rcpt: &str, payload: &str) -> String {
        let reply = self.command(&format!("MAIL FROM:<{from}>")).await;
        assert!(reply.starts_with("250"), "mail from: {reply}");
        let reply = self.command(&format!("RCPT TO:<{rcpt}>")).await;
        assert!(reply.starts_with("250"), "rcpt to: {reply}");
        let reply = self.command("DATA").await;
        assert!(reply.starts_with("354"), "data: {reply}");
        self.writer
            .write_all(payload.as_bytes())
            .await
            .expect("write payload");
        self.writer
            .write_all(b"\r\n.\r\n")
            .await
            .expect("write terminator");
        self.read_reply().await
    }
}

fn reply_id(reply: &str) -> i64 {
    reply
        .trim()
        .strip_prefix("250 OK id=")
        .expect("reply carries an id")
        .parse()
        .expect("numeric id")
}

#[tokio::test]
async fn smtp_delivery_lands_in_the_right_inbox() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    let reply = session.command("EHLO tester").await;
    assert!(reply.starts_with("250"), "ehlo: {reply}");

    let reply = session
        .send_mail(
            "dev@example.test",
            "abc123@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: abc123@example.test\r\n",
                "Subject: Hello\r\n",
                "\r\n",
                "world",
            ),
        )
        .await;
    assert!(reply.starts_with("250 OK id="), "data reply: {reply}");

    let reply = session
        .send_mail(
            "dev@example.test",
            "xyz789@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: xyz789@example.test\r\n",
                "Subject: Other\r\n",
                "\r\n",
                "different body",
            ),
        )
        .await;
    assert!(reply.starts_with("250 OK id="), "data reply: {reply}");
    session.command("QUIT").await;

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/inbox/abc123", server.http_base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let v: serde_json::Value = res.json().await.unwrap();
    let emails = v["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["from_addr"].as_str(), Some("dev@example.test"));
    assert_eq!(emails[0]["subject"].as_str(), Some("Hello"));
    assert!(emails[0]["snippet"].as_str().unwrap().starts_with("world"));

    // Full fetch carries the bodies the listing omits
    let id = emails[0]["id"].as_i64().unwrap();
    let res = client
        .get(format!("{}/api/message/{}", server.http_base, id))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let full: serde_json::Value = res.json().await.unwrap();
    assert_eq!(full["inbox_id"].as_str(), Some("abc123"));
    assert_eq!(full["to_addr"].as_str(), Some("abc123"));
    assert_eq!(full["text_body"].as_str().unwrap().trim_end(), "world");
    assert_eq!(full["html_body"].as_str(), Some(""));

    // The second inbox only ever saw its own message
    let res = client
        .get(format!("{}/api/inbox/xyz789", server.http_base))
        .send()
        .await
        .unwrap();
    let v: serde_json::Value = res.json().await.unwrap();
    let emails = v["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["subject"].as_str(), Some("Other"));
}

#[tokio::test]
async fn stored_id_resolves_immediately_after_accept() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;

    let reply = session
        .send_mail(
            "dev@example.test",
            "keeper@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: keeper@example.test\r\n",
                "Subject: Durable\r\n",
                "\r\n",
                "still here",
            ),
        )
        .await;
    let id = reply_id(&reply);

    // The 250 only goes out after the row is committed, so the id must
    // already be fetchable.
    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/message/{}", server.http_base, id))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let full: serde_json::Value = res.json().await.unwrap();
    assert_eq!(full["subject"].as_str(), Some("Durable"));
}

#[tokio::test]
async fn mail_without_recipient_header_falls_back_to_unknown() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;

    // Envelope recipient is present but the message has no To header;
    // routing only ever looks at the headers.
    let reply = session
        .send_mail(
            "dev@example.test",
            "someone@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "Subject: Lost\r\n",
                "\r\n",
                "no destination",
            ),
        )
        .await;
    assert!(reply.starts_with("250 OK id="), "data reply: {reply}");

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/inbox/unknown", server.http_base))
        .send()
        .await
        .unwrap();
    let v: serde_json::Value = res.json().await.unwrap();
    let emails = v["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["subject"].as_str(), Some("Lost"));
}

#[tokio::test]
async fn unparseable_payload_is_rejected_and_not_stored() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;

    // A continuation line with nothing to continue makes the parser bail
    let reply = session
        .send_mail(
            "dev@example.test",
            "victim@example.test",
            " folded without parent\r\nSubject: x\r\n\r\nbody",
        )
        .await;
    assert!(reply.starts_with("550"), "data reply: {reply}");

    // Rejection means nothing was stored anywhere
    let client = reqwest::Client::new();
    for inbox in ["victim", "unknown"] {
        let res = client
            .get(format!("{}/api/inbox/{}", server.http_base, inbox))
            .send()
            .await
            .unwrap();
        let v: serde_json::Value = res.json().await.unwrap();
        assert_eq!(v["emails"].as_array().unwrap().len(), 0, "inbox {inbox}");
    }
}

#[tokio::test]
async fn garbage_header_line_is_accepted_not_rejected() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;

    // The parser shrugs at a header line with no colon; with no usable To
    // or From the delivery lands under the sentinels
    let reply = session
        .send_mail(
            "dev@example.test",
            "victim@example.test",
            "this first line is not a valid header\r\n\r\nbody",
        )
        .await;
    let id = reply_id(&reply);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/message/{}", server.http_base, id))
        .send()
        .await
        .unwrap();
    let full: serde_json::Value = res.json().await.unwrap();
    assert_eq!(full["inbox_id"].as_str(), Some("unknown"));
    assert_eq!(full["from_addr"].as_str(), Some("unknown"));
    assert_eq!(full["subject"].as_str(), Some("(No Subject)"));
    assert_eq!(full["text_body"].as_str().unwrap().trim_end(), "body");
}

#[tokio::test]
async fn dot_stuffed_lines_are_unstuffed() {
    let server = start_server().await;
    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;

    let reply = session
        .send_mail(
            "dev@example.test",
            "dots@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: dots@example.test\r\n",
                "Subject: Dots\r\n",
                "\r\n",
                "..leading dot\r\n",
                "plain line",
            ),
        )
        .await;
    let id = reply_id(&reply);

    let client = reqwest::Client::new();
    let res = client
        .get(format!("{}/api/message/{}", server.http_base, id))
        .send()
        .await
        .unwrap();
    let full: serde_json::Value = res.json().await.unwrap();
    let text = full["text_body"].as_str().unwrap();
    assert!(text.starts_with(".leading dot"), "text: {text:?}");
    assert!(text.contains("plain line"));
}

#[tokio::test]
async fn sse_stream_delivers_new_mail_notification() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    // Once the response headers are in, the subscriber is registered
    let res = client
        .get(format!("{}/api/events?inbox=watcher1", server.http_base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let mut stream = res.bytes_stream();

    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;
    let reply = session
        .send_mail(
            "dev@example.test",
            "watcher1@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: watcher1@example.test\r\n",
                "Subject: Hello\r\n",
                "\r\n",
                "world",
            ),
        )
        .await;
    assert!(reply.starts_with("250 OK id="), "data reply: {reply}");

    let collected = tokio::time::timeout(Duration::from_secs(5), async {
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.expect("sse chunk");
            collected.push_str(std::str::from_utf8(&chunk).expect("utf8 chunk"));
            if collected.contains(r#""snippet":"world"#) {
                break;
            }
        }
        collected
    })
    .await
    .expect("timed out waiting for sse event");

    assert!(collected.contains("event: new_email"), "got: {collected:?}");
    assert!(collected.contains(r#""inbox_id":"watcher1""#));
    assert!(collected.contains(r#""from_addr":"dev@example.test""#));
    assert!(collected.contains(r#""subject":"Hello""#));
}

#[tokio::test]
async fn sse_stream_is_scoped_to_its_inbox() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/events?inbox=quiet", server.http_base))
        .send()
        .await
        .unwrap();
    let mut stream = res.bytes_stream();

    let mut session = SmtpSession::connect(server.smtp_addr).await;
    session.command("HELO tester").await;
    session
        .send_mail(
            "dev@example.test",
            "noisy@example.test",
            concat!(
                "From: dev@example.test\r\n",
                "To: noisy@example.test\r\n",
                "Subject: Elsewhere\r\n",
                "\r\n",
                "not for you",
            ),
        )
        .await;

    // Nothing but silence for an inbox that got no mail
    let got = tokio::time::timeout(Duration::from_millis(500), stream.next()).await;
    match got {
        Err(_) => {}
        Ok(Some(chunk)) => {
            let text = String::from_utf8_lossy(&chunk.expect("sse chunk")).to_string();
            assert!(
                !text.contains("new_email"),
                "unexpected event for quiet inbox: {text:?}"
            );
        }
        Ok(None) => panic!("sse stream ended unexpectedly"),
    }
}

#[tokio::test]
async fn address_endpoint_mints_inboxes_under_the_domain() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/address", server.http_base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let v: serde_json::Value = res.json().await.unwrap();
    let address = v["address"].as_str().unwrap();
    let (local, domain) = address.split_once('@').unwrap();
    assert_eq!(domain, "example.test");
    assert_eq!(local.len(), 8);
    assert!(
        local
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    );

    // A second call almost certainly differs
    let res = client
        .get(format!("{}/api/address", server.http_base))
        .send()
        .await
        .unwrap();
    let v2: serde_json::Value = res.json().await.unwrap();
    assert!(v2["address"].as_str().is_some());
}

#[tokio::test]
async fn unknown_message_id_is_a_404() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/message/999999", server.http_base))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

    // Listing an inbox nobody mailed is an empty list, not an error
    let res = client
        .get(format!("{}/api/inbox/neverused", server.http_base))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let v: serde_json::Value = res.json().await.unwrap();
    assert_eq!(v["emails"].as_array().unwrap().len(), 0);
}
