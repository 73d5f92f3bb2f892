#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::{Duration, Instant};

    /// A response read off the wire.
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).to_string()
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> Option<usize> {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
    }

    /// Write a raw request and read one response.
    ///
    /// Stops as soon as `Content-Length` bytes of body have arrived, or after the read
    /// timeout when the server does not send a length.
    pub fn send_request(addr: &SocketAddr, req: &str) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = Vec::new();
        while Instant::now() < deadline {
            let mut tmp = [0u8; 4096];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    if !buf.is_empty() {
                        break;
                    }
                    continue;
                }
                Err(e) => panic!("read failed: {e}"),
            }
            if let Some(end) = find_header_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                if let Some(len) = content_length(&head) {
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
        }
        buf
    }

    pub fn parse_response(raw: &[u8]) -> RawResponse {
        let end = find_header_end(raw).expect("response has no header terminator");
        let head = String::from_utf8_lossy(&raw[..end]).to_string();
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .expect("status line");
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let mut body = raw[end + 4..].to_vec();
        if let Some(len) = content_length(&head) {
            body.truncate(len);
        }
        RawResponse {
            status,
            headers,
            body,
        }
    }

    pub fn request(addr: &SocketAddr, method: &str, path: &str) -> RawResponse {
        let raw = send_request(
            addr,
            &format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n"),
        );
        parse_response(&raw)
    }

    pub fn get(addr: &SocketAddr, path: &str) -> RawResponse {
        request(addr, "GET", path)
    }

    /// GET with extra request headers; `None` when the server closed without answering.
    pub fn get_with_headers(
        addr: &SocketAddr,
        path: &str,
        headers: &[(String, String)],
    ) -> Option<RawResponse> {
        let mut req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n");
        for (name, value) in headers {
            req.push_str(&format!("{name}: {value}\r\n"));
        }
        req.push_str("Content-Length: 0\r\n\r\n");
        let raw = send_request(addr, &req);
        (!raw.is_empty()).then(|| parse_response(&raw))
    }

    pub fn post(addr: &SocketAddr, path: &str, body: &str) -> RawResponse {
        let raw = send_request(
            addr,
            &format!(
                "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        );
        parse_response(&raw)
    }
}

pub mod sessions {
    use dashrouter::registry::{
        session_app, SessionApp, SessionFactory, SessionOptions, SessionRequest, SessionResponse,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;

    /// What the tests register: a titled page, optionally broken on purpose.
    #[derive(Debug)]
    pub struct Notebook {
        pub title: String,
        pub behaviour: Behaviour,
    }

    #[derive(Debug, Clone)]
    pub enum Behaviour {
        Serve,
        Fail,
        Panic,
        /// Answer with this many `x-h{i}: v{i}` headers on top of the content type
        Headers(usize),
        /// Answer with a header value that smuggles a second header line
        BadHeader,
        /// Hold every request until the gate opens
        Wait(Arc<Gate>),
    }

    /// Holds a session request open until the test releases it.
    ///
    /// The session side waits on a may channel so the coroutine yields its worker.
    #[derive(Debug)]
    pub struct Gate {
        entered_tx: Mutex<mpsc::Sender<()>>,
        entered_rx: Mutex<mpsc::Receiver<()>>,
        release_tx: Mutex<may::sync::mpsc::Sender<()>>,
        release_rx: Mutex<may::sync::mpsc::Receiver<()>>,
    }

    impl Gate {
        pub fn new() -> Arc<Self> {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = may::sync::mpsc::channel();
            Arc::new(Self {
                entered_tx: Mutex::new(entered_tx),
                entered_rx: Mutex::new(entered_rx),
                release_tx: Mutex::new(release_tx),
                release_rx: Mutex::new(release_rx),
            })
        }

        /// Session side: report arrival, then wait for release.
        pub fn pass(&self) {
            let _ = self.entered_tx.lock().unwrap().send(());
            let _ = self.release_rx.lock().unwrap().recv();
        }

        /// Test side: wait until a request is held.
        pub fn wait_entered(&self, timeout: Duration) -> bool {
            self.entered_rx.lock().unwrap().recv_timeout(timeout).is_ok()
        }

        pub fn open(&self) {
            let _ = self.release_tx.lock().unwrap().send(());
        }
    }

    impl Notebook {
        pub fn new(title: &str) -> Arc<Self> {
            Arc::new(Self {
                title: title.to_string(),
                behaviour: Behaviour::Serve,
            })
        }

        pub fn with(title: &str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                title: title.to_string(),
                behaviour,
            })
        }
    }

    /// Builds one page app per notebook and counts the builds.
    #[derive(Default)]
    pub struct NotebookFactory {
        pub created: Arc<AtomicUsize>,
        pub prefixes: Arc<Mutex<Vec<String>>>,
    }

    impl SessionFactory for NotebookFactory {
        type Context = Notebook;

        fn create_session(
            &self,
            ctx: &Notebook,
            options: &SessionOptions,
            prefix: &str,
        ) -> anyhow::Result<Arc<dyn SessionApp>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.prefixes.lock().unwrap().push(prefix.to_string());

            let title = ctx.title.clone();
            let behaviour = ctx.behaviour.clone();
            let prefix = prefix.to_string();
            let shared = options.share_tables.is_some();
            Ok(session_app(move |req: &SessionRequest| match &behaviour {
                Behaviour::Fail => Err(anyhow::anyhow!("layout for {title} is broken")),
                Behaviour::Panic => panic!("callback for {title} exploded"),
                Behaviour::Headers(n) => {
                    let mut resp = SessionResponse::html(200, format!("<h1>{title}</h1>"));
                    for i in 0..*n {
                        resp = resp.with_header(&format!("x-h{i}"), format!("v{i}"));
                    }
                    Ok(resp)
                }
                Behaviour::BadHeader => Ok(SessionResponse::html(200, format!("<h1>{title}</h1>"))
                    .with_header("x-note", "a\r\nset-cookie: injected=1".to_string())),
                Behaviour::Wait(gate) => {
                    gate.pass();
                    Ok(SessionResponse::html(200, format!("<h1>{title}</h1>")))
                }
                Behaviour::Serve => match req.path_within(&prefix) {
                    Some("") => Ok(SessionResponse::html(200, format!("<h1>{title}</h1>"))),
                    Some(rest) => Ok(SessionResponse::json(
                        200,
                        &json!({
                            "title": title,
                            "rest": rest,
                            "path": req.path,
                            "method": req.method.as_str(),
                            "query": req.query,
                            "body": String::from_utf8_lossy(&req.body),
                            "shared": shared,
                        }),
                    )
                    .with_header("x-session", req.session_id.to_string())),
                    None => Ok(SessionResponse::text(404, format!("outside {prefix}"))),
                },
            }))
        }
    }
}

pub mod net {
    use std::net::{SocketAddr, TcpListener};

    /// A loopback address that was free a moment ago.
    pub fn free_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }
}

pub mod runtime {
    use dashrouter::runtime_config::RuntimeConfig;
    use std::time::Duration;

    pub fn test_runtime() -> RuntimeConfig {
        RuntimeConfig {
            stack_size: 0x8000,
            shutdown_timeout: Duration::from_secs(3),
            ping_timeout: Duration::from_millis(500),
            startup_timeout: Duration::from_secs(2),
        }
    }
}
