#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Local stand-in for the events site. Answers with the given responses in order,
/// repeating the last one, and records every request head it receives.
pub struct StubSite {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubSite {
    pub async fn start(responses: Vec<(u16, String)>) -> Self {
        assert!(!responses.is_empty());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            let mut served = 0;

            while let Ok((mut stream, _)) = listener.accept().await {
                let head = read_head(&mut stream).await;
                recorded.lock().unwrap().push(head);

                let (status, body) = &responses[served.min(responses.len() - 1)];
                served += 1;

                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { base, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut buffer = [0u8; 1024];

    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        match stream.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(read) => head.extend_from_slice(&buffer[..read]),
        }
    }

    String::from_utf8_lossy(&head).to_string()
}

pub fn listing_page() -> String {
    r#"<!DOCTYPE html><html><body>
      <div class="row">
        <div class="col"><a href="/f1"><h4 class="date-eventos">Fiestas de San Juan</h4></a></div>
        <div class="col"><img src="/Servicios/cmsdipro/img/sanjuan.jpg" alt="San Juan">
          <div class="vista-fiestas-resumen">
            <p>Del : 2024-06-23 Al: 2024-06-24</p>
            <p>Lugar: Carboneras</p>
          </div>
        </div>
      </div>
      <div class="row">
        <h4 class="date-eventos">Feria de Octubre</h4>
        <div class="vista-fiestas-resumen"><p>Perido: Otoño</p><p>Tipo: Feria</p></div>
      </div>
    </body></html>"#
        .to_string()
}
