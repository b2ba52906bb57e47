//! Integration tests driving the reactor and HTTP client against a real
//! socket. A minimal same-thread HTTP/1.1 test server runs on its own OS
//! thread; the crawler core itself never spawns one.

use std::cell::RefCell;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use url::Url;

use crawlcore::{Crawler, CrawlerConfig, HttpClient, Reactor, RequestCallbacks};

/// Serves `responses` in order, one per accepted connection, recording each
/// request's raw bytes up to the end of its headers.
fn spawn_server(responses: Vec<Vec<u8>>) -> (SocketAddr, Arc<Mutex<Vec<Vec<u8>>>>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_for_thread = requests.clone();

    let handle = std::thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else { break };
            let mut read_buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        read_buf.extend_from_slice(&chunk[..n]);
                        if read_buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            requests_for_thread.lock().unwrap().push(read_buf);
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });

    (addr, requests, handle)
}

#[test]
fn get_200_delivers_status_and_body() {
    env_logger::try_init().ok();
    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
    let (addr, _requests, server) = spawn_server(vec![response]);

    let mut reactor = Reactor::new().unwrap();
    let client = HttpClient::new().unwrap();
    let url = Url::parse(&format!("http://{addr}/ok")).unwrap();

    let body = Rc::new(RefCell::new(Vec::new()));
    let status = Rc::new(RefCell::new(0u16));
    let body_for_data = body.clone();
    let status_for_complete = status.clone();

    let callbacks = RequestCallbacks::new(move |_reactor, _handle, response| {
        *status_for_complete.borrow_mut() = response.status;
    })
    .with_data_cb(move |chunk| body_for_data.borrow_mut().extend_from_slice(chunk));

    client.get(&mut reactor, url, callbacks).unwrap();
    reactor.dispatch().unwrap();
    server.join().unwrap();

    assert_eq!(*status.borrow(), 200);
    assert_eq!(&*body.borrow(), b"hello");
}

#[test]
fn redirect_chain_resolves_to_final_response() {
    env_logger::try_init().ok();
    let redirect = b"HTTP/1.1 302 Found\r\nLocation: /final\r\nContent-Length: 0\r\n\r\n".to_vec();
    let final_response = b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone".to_vec();
    let (addr, _requests, server) = spawn_server(vec![redirect, final_response]);

    let mut reactor = Reactor::new().unwrap();
    let client = HttpClient::new().unwrap();
    let url = Url::parse(&format!("http://{addr}/start")).unwrap();

    let result = Rc::new(RefCell::new(None));
    let result_slot = result.clone();
    let callbacks = RequestCallbacks::new(move |_reactor, _handle, response| {
        *result_slot.borrow_mut() = Some((response.effective_url.clone(), response.status, response.body.clone()));
    });

    client.get(&mut reactor, url, callbacks).unwrap();
    reactor.dispatch().unwrap();
    server.join().unwrap();

    let (effective_url, status, body) = result.borrow_mut().take().expect("complete_cb fired once");
    assert_eq!(effective_url.path(), "/final");
    assert_eq!(status, 200);
    assert_eq!(body, b"done");
}

#[test]
fn cookie_set_by_first_response_is_emitted_on_second_request() {
    env_logger::try_init().ok();
    let first = b"HTTP/1.1 200 OK\r\nSet-Cookie: sid=abc; Path=/\r\nContent-Length: 0\r\n\r\n".to_vec();
    let second = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec();
    let (addr, requests, server) = spawn_server(vec![first, second]);

    let mut reactor = Reactor::new().unwrap();
    let client = HttpClient::new().unwrap();

    let done = Rc::new(RefCell::new(0));
    let done_cb = done.clone();
    let callbacks1 = RequestCallbacks::new(move |_reactor, _handle, _response| {
        *done_cb.borrow_mut() += 1;
    });
    client.get(&mut reactor, Url::parse(&format!("http://{addr}/")).unwrap(), callbacks1).unwrap();
    reactor.dispatch().unwrap();

    let done_cb2 = done.clone();
    let callbacks2 = RequestCallbacks::new(move |_reactor, _handle, _response| {
        *done_cb2.borrow_mut() += 1;
    });
    client.get(&mut reactor, Url::parse(&format!("http://{addr}/page")).unwrap(), callbacks2).unwrap();
    reactor.dispatch().unwrap();

    server.join().unwrap();
    assert_eq!(*done.borrow(), 2);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let second_request = String::from_utf8_lossy(&requests[1]);
    assert!(second_request.contains("Cookie: sid=abc"), "second request was:\n{second_request}");
}

#[test]
fn visited_url_is_dispatched_exactly_once_even_when_the_page_links_to_itself() {
    env_logger::try_init().ok();
    let body = b"<a href=\"/\">self</a>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        String::from_utf8_lossy(body)
    );
    let (addr, requests, server) = spawn_server(vec![response.into_bytes()]);

    let mut reactor = Reactor::new().unwrap();
    let page_hits = Rc::new(RefCell::new(0));
    let page_hits_cb = page_hits.clone();
    let crawler = Crawler::new(
        &mut reactor,
        CrawlerConfig::default(),
        move |_url, _status, _body| *page_hits_cb.borrow_mut() += 1,
        |_url, _transport| {},
    )
    .unwrap();

    let url = Url::parse(&format!("http://{addr}/")).unwrap();
    assert!(crawler.add_url(&mut reactor, url.clone()));
    assert!(crawler.add_url(&mut reactor, url));

    reactor.dispatch().unwrap();
    server.join().unwrap();

    assert_eq!(*page_hits.borrow(), 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(crawler.stats().dispatched, 1);
}
