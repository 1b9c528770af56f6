//! Test doubles and one-time test setup.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::env;
use std::sync::Once;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::infrastructure::{
    RemoteRequest, RemoteResponse, Transport, TransportError, TransportResult,
};

static TEST_SETUP: Once = Once::new();

pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        if env::var("RUST_LOG").is_err() {
            env::set_var("RUST_LOG", "trace");
        }
        // global logging subscriber, used by all tracing log macros
        setup_test_logging();
        info!("Test Setup complete");
    });
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");

    // Create a filter for noisy modules
    let noisy_modules = ["tokio"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

enum Scripted {
    Reply(TransportResult<RemoteResponse>),
    Deferred(oneshot::Receiver<RemoteResponse>),
}

/// Transport answering from a queue of scripted replies, in request order.
///
/// Every request is recorded. A request with nothing scripted fails with
/// [`TransportError::Closed`].
#[derive(Default)]
pub struct ScriptedTransport {
    script: RefCell<VecDeque<Scripted>>,
    requests: RefCell<Vec<RemoteRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: RemoteResponse) -> &Self {
        self.script
            .borrow_mut()
            .push_back(Scripted::Reply(Ok(response)));
        self
    }

    /// 200 with `body`.
    pub fn respond_json(&self, body: Value) -> &Self {
        self.respond(RemoteResponse::ok(body))
    }

    pub fn fail(&self, error: TransportError) -> &Self {
        self.script.borrow_mut().push_back(Scripted::Reply(Err(error)));
        self
    }

    /// Next request stays pending until the returned sender is used.
    ///
    /// Dropping the sender resolves the request with `TransportError::Closed`.
    pub fn defer(&self) -> oneshot::Sender<RemoteResponse> {
        let (tx, rx) = oneshot::channel();
        self.script.borrow_mut().push_back(Scripted::Deferred(rx));
        tx
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    async fn send(&self, request: RemoteRequest) -> TransportResult<RemoteResponse> {
        debug!(command = %request.command, url = %request.url, "scripted send");
        self.requests.borrow_mut().push(request);
        let next = self.script.borrow_mut().pop_front();
        match next {
            Some(Scripted::Reply(reply)) => reply,
            Some(Scripted::Deferred(rx)) => rx.await.map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }
}
