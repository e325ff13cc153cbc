//! Tests de integración para el servidor HTTP
//! tests/integration_test.rs
//!
//! Cada test levanta su propio `Server` en 127.0.0.1:0 dentro de un thread y
//! habla con él por TCP. El contenido (html, scripts CGI, credenciales) se
//! crea una sola vez en un directorio temporal.

use cgi_reactor::config::Config;
use cgi_reactor::error::ServerError;
use cgi_reactor::handlers::login::hash_password;
use cgi_reactor::server::{Server, ShutdownHandle};
use cgi_reactor::storage::JsonRecordStore;
use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Directorio del fixture: `www/` es el root, `secret.txt` queda fuera
fn fixture_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("cgi_reactor_it_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let www = dir.join("www");
        fs::create_dir_all(www.join("cgi-bin")).unwrap();
        fs::create_dir_all(www.join("docs")).unwrap();
        fs::create_dir_all(dir.join("pids")).unwrap();

        fs::write(dir.join("secret.txt"), "TOP-SECRET").unwrap();
        fs::write(www.join("index.html"), "<h1>index</h1>").unwrap();
        fs::write(www.join("style.css"), "body{}").unwrap();
        fs::write(www.join("welcome.html"), "<h1>welcome</h1>").unwrap();
        fs::write(www.join("docs/index.html"), "<h1>docs</h1>").unwrap();
        for name in ["a", "b", "c"] {
            fs::write(www.join(format!("{}.txt", name)), format!("body-{}", name)).unwrap();
        }

        // hold.sh deja su pid en pids/<QUERY_STRING> y duerme con ese mismo pid
        let hold = format!(
            "#!/bin/sh\nPATH=/usr/bin:/bin\nprintf '%s' $$ > '{}'/\"$QUERY_STRING\"\nexec sleep 30\n",
            dir.join("pids").display()
        );
        let scripts = [
            ("query.sh", "#!/bin/sh\nprintf '%s' \"$QUERY_STRING\"\n".to_string()),
            (
                "post.sh",
                "#!/bin/sh\nPATH=/usr/bin:/bin\nprintf 'len=%s;' \"$CONTENT_LENGTH\"\ncat\n".to_string(),
            ),
            ("slow.sh", "#!/bin/sh\nPATH=/usr/bin:/bin\nsleep 1\nprintf 'done'\n".to_string()),
            ("sleep.sh", "#!/bin/sh\nPATH=/usr/bin:/bin\nexec sleep 30\n".to_string()),
            ("hold.sh", hold),
        ];
        for (name, body) in scripts {
            let path = www.join("cgi-bin").join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let credentials = format!(
            r#"{{"ana": {{"key": "ana", "password_sha256": "{}"}}}}"#,
            hash_password("hunter2")
        );
        fs::write(dir.join("credentials.json"), credentials).unwrap();

        dir
    })
}

struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    fn start(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = fixture_dir();
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 0;
        config.root = dir.join("www");
        config.workers = 4;
        configure(&mut config);

        let store = JsonRecordStore::load(&dir.join("credentials.json")).unwrap();
        let mut server = Server::bind(config, Arc::new(store)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());

        Self {
            addr,
            handle,
            thread: Some(thread),
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        stream.set_nodelay(true).unwrap();
        stream
    }

    /// Envía un request y lee hasta que el servidor cierra
    fn exchange(&self, raw: &[u8]) -> String {
        let mut stream = self.connect();
        stream.write_all(raw).unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    fn get(&self, path: &str) -> String {
        self.exchange(format!("GET {} HTTP/1.0\r\n\r\n", path).as_bytes())
    }

    /// Apaga y espera al thread del reactor; devuelve cuánto tardó
    fn stop(&mut self) -> Duration {
        let start = Instant::now();
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap().unwrap();
        }
        start.elapsed()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Lee una respuesta enmarcada por Content-Length de una conexión keep-alive
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert_eq!(n, 1, "connection closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();

    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().unwrap())
        })
        .unwrap_or(0);

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).unwrap();
    (head, body)
}

fn body_of(response: &str) -> &str {
    response.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

/// Reintenta `check` cada 20 ms hasta que devuelva algo o pase `timeout`
fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check() {
            return Some(value);
        }
        if Instant::now() > deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

/// Pide hold.sh por `stream` y devuelve el pid del hijo
fn start_held_cgi(stream: &mut TcpStream, tag: &str) -> u32 {
    let pid_file = fixture_dir().join("pids").join(tag);
    let _ = fs::remove_file(&pid_file);

    stream
        .write_all(format!("GET /cgi-bin/hold.sh?{} HTTP/1.1\r\n\r\n", tag).as_bytes())
        .unwrap();

    wait_for(Duration::from_secs(5), || {
        fs::read_to_string(&pid_file).ok()?.trim().parse::<u32>().ok()
    })
    .expect("hold.sh never reported its pid")
}

fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[test]
fn test_static_index() {
    let server = TestServer::start(|_| {});
    let response = server.get("/");

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
    assert!(response.contains("Content-Type: text/html\r\n"));
    assert!(response.contains("Content-Length: 14\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert_eq!(body_of(&response), "<h1>index</h1>");
}

#[test]
fn test_static_directory_and_mime() {
    let server = TestServer::start(|_| {});

    let response = server.get("/docs/");
    assert_eq!(body_of(&response), "<h1>docs</h1>");

    let response = server.get("/style.css");
    assert!(response.contains("Content-Type: text/css\r\n"));
}

#[test]
fn test_not_found() {
    let server = TestServer::start(|_| {});
    let response = server.get("/missing.html");
    assert!(response.starts_with("HTTP/1.0 404 Not Found\r\n"), "got: {}", response);
}

#[test]
fn test_path_traversal_never_escapes_root() {
    let server = TestServer::start(|_| {});

    for path in ["/../secret.txt", "/docs/../../secret.txt", "/%2e%2e/secret.txt"] {
        let response = server.get(path);
        assert!(
            response.starts_with("HTTP/1.0 404") || response.starts_with("HTTP/1.0 400"),
            "{} -> {}",
            path,
            response
        );
        assert!(!response.contains("TOP-SECRET"));
    }
}

#[test]
fn test_malformed_request() {
    let server = TestServer::start(|_| {});
    let response = server.exchange(b"NOT-HTTP\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got: {}", response);
}

#[test]
fn test_cgi_query_string() {
    let server = TestServer::start(|_| {});
    let response = server.get("/cgi-bin/query.sh?name=ana&n=1");

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
    assert_eq!(body_of(&response), "name=ana&n=1");
}

#[test]
fn test_cgi_post_body_fidelity() {
    let server = TestServer::start(|_| {});

    // Más grande que un buffer de pipe
    let payload: String = (0..200_000).map(|i| (b'a' + (i % 26) as u8) as char).collect();
    let request = format!(
        "POST /cgi-bin/post.sh HTTP/1.0\r\nContent-Length: {}\r\n\r\n{}",
        payload.len(),
        payload
    );
    let response = server.exchange(request.as_bytes());

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert_eq!(body_of(&response), format!("len={};{}", payload.len(), payload));
}

#[test]
fn test_concurrent_requests_are_isolated() {
    let server = Arc::new(TestServer::start(|_| {}));

    let clients: Vec<_> = (0..16)
        .map(|i| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let response = server.get(&format!("/cgi-bin/query.sh?client={}", i));
                assert_eq!(body_of(&response), format!("client={}", i));
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }
}

#[test]
fn test_concurrent_static_files_are_isolated() {
    let server = Arc::new(TestServer::start(|_| {}));

    let clients: Vec<_> = (0..24)
        .map(|i| {
            let server = Arc::clone(&server);
            let name = ["a", "b", "c"][i % 3];
            thread::spawn(move || {
                let response = server.get(&format!("/{}.txt", name));
                assert_eq!(body_of(&response), format!("body-{}", name));
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }
}

#[test]
fn test_keep_alive_preserves_order() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    // Tres requests en una sola escritura
    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\n\r\nGET /b.txt HTTP/1.1\r\n\r\nGET /c.txt HTTP/1.1\r\n\r\n")
        .unwrap();

    for name in ["a", "b", "c"] {
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert_eq!(body, format!("body-{}", name).into_bytes());
    }

    // La misma conexión sigue sirviendo
    stream.write_all(b"GET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.contains("Connection: close\r\n"));
    assert_eq!(body, b"body-a");

    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_byte_at_a_time_client() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    for byte in b"POST /cgi-bin/post.sh HTTP/1.0\r\nContent-Length: 5\r\n\r\nhello" {
        stream.write_all(&[*byte]).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
    assert_eq!(body_of(&response), "len=5;hello");
}

#[test]
fn test_slow_cgi_does_not_block_other_clients() {
    let server = Arc::new(TestServer::start(|_| {}));

    let slow = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.get("/cgi-bin/slow.sh"))
    };
    thread::sleep(Duration::from_millis(100));

    let start = Instant::now();
    let response = server.get("/index.html");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"));
    assert!(start.elapsed() < Duration::from_millis(800));

    assert_eq!(body_of(&slow.join().unwrap()), "done");
}

#[test]
fn test_login() {
    let server = TestServer::start(|_| {});

    let ok = "user=ana&password=hunter2";
    let response = server.exchange(
        format!("POST /login HTTP/1.0\r\nContent-Length: {}\r\n\r\n{}", ok.len(), ok).as_bytes(),
    );
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
    assert_eq!(body_of(&response), "<h1>welcome</h1>");

    let bad = "user=ana&password=nope";
    let response = server.exchange(
        format!("POST /login HTTP/1.0\r\nContent-Length: {}\r\n\r\n{}", bad.len(), bad).as_bytes(),
    );
    assert!(response.starts_with("HTTP/1.0 403 Forbidden\r\n"), "got: {}", response);
}

#[test]
fn test_payload_too_large() {
    let server = TestServer::start(|config| config.max_request_bytes = 1024);

    let mut request = b"POST /cgi-bin/post.sh HTTP/1.0\r\nContent-Length: 4096\r\n\r\n".to_vec();
    request.extend_from_slice(&[b'x'; 1500]);
    let response = server.exchange(&request);

    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "got: {}", response);
}

#[test]
fn test_declared_length_too_large_rejected_before_body() {
    let server = TestServer::start(|config| config.max_request_bytes = 1024);

    // Solo la cabecera: el 413 no espera al body
    let response =
        server.exchange(b"POST /cgi-bin/post.sh HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "got: {}", response);
}

#[test]
fn test_overflowing_content_length_is_rejected() {
    let server = TestServer::start(|_| {});

    let response =
        server.exchange(b"POST /x HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got: {}", response);

    // El reactor sigue vivo
    let response = server.get("/index.html");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
}

#[test]
fn test_conflicting_content_length_is_rejected() {
    let server = TestServer::start(|_| {});

    let response = server.exchange(
        b"POST /cgi-bin/post.sh HTTP/1.1\r\ncontent-length: 3\r\nContent-Length: 10\r\n\r\n0123456789",
    );
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got: {}", response);
    assert!(!response.contains("len="));
}

#[test]
fn test_client_disconnect_kills_cgi() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();
    let pid = start_held_cgi(&mut stream, "disconnect");
    assert!(process_exists(pid));

    drop(stream);

    let gone = wait_for(Duration::from_secs(5), || (!process_exists(pid)).then_some(()));
    assert!(gone.is_some(), "CGI child {} outlived its client", pid);

    let response = server.get("/index.html");
    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "got: {}", response);
}

#[test]
fn test_client_half_close_kills_cgi_on_keep_alive_connection() {
    let server = TestServer::start(|_| {});
    let mut stream = server.connect();

    // Un request servido antes: la conexión ya pasó por recycle
    stream.write_all(b"GET /a.txt HTTP/1.1\r\n\r\n").unwrap();
    let (_, body) = read_response(&mut stream);
    assert_eq!(body, b"body-a");

    let pid = start_held_cgi(&mut stream, "half-close");
    stream.shutdown(Shutdown::Write).unwrap();

    let gone = wait_for(Duration::from_secs(5), || (!process_exists(pid)).then_some(()));
    assert!(gone.is_some(), "CGI child {} outlived its client", pid);

    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest);
    assert!(rest.is_empty());
}

#[test]
fn test_queue_full_answers_503() {
    let mut server = TestServer::start(|config| {
        config.workers = 1;
        config.queue_capacity = 1;
    });

    // Ocupa al único worker
    let mut busy = server.connect();
    busy.write_all(b"GET /cgi-bin/sleep.sh HTTP/1.0\r\n\r\n").unwrap();
    thread::sleep(Duration::from_millis(200));

    // Llena la cola
    let mut queued = server.connect();
    queued.write_all(b"GET /index.html HTTP/1.0\r\n\r\n").unwrap();
    thread::sleep(Duration::from_millis(200));

    let response = server.get("/index.html");
    assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"), "got: {}", response);

    // El apagado cancela el CGI de 30 s
    assert!(server.stop() < Duration::from_secs(10));
}

#[test]
fn test_shutdown_cancels_cgi_in_flight() {
    let mut server = TestServer::start(|_| {});
    let mut stream = server.connect();
    stream.write_all(b"GET /cgi-bin/sleep.sh HTTP/1.0\r\n\r\n").unwrap();
    thread::sleep(Duration::from_millis(200));

    assert!(server.stop() < Duration::from_secs(10));

    // El cliente ve el cierre, sin respuesta
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest);
    assert!(rest.is_empty());
}

#[test]
fn test_idle_connection_is_closed() {
    let server = TestServer::start(|config| config.idle_timeout_ms = 300);
    let mut stream = server.connect();

    let start = Instant::now();
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
}
