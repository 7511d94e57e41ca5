use std::sync::Arc;

use bookbuddy_api::{
    ApiService, EventBus, EventKind, RateLimit, ServiceEvent, ServiceOptions,
    GOOGLE_BOOKS_BASE_URL, OPEN_LIBRARY_BASE_URL,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bus = Arc::new(EventBus::new());

    bus.subscribe_to(EventKind::LoadingStateChanged, |event| {
        if let ServiceEvent::LoadingStateChanged { is_loading, active_count } = event {
            println!("loading={is_loading} active={active_count}");
        }
    });
    bus.subscribe_to(EventKind::RequestFailed, |event| {
        if let ServiceEvent::RequestFailed { url, error, .. } = event {
            eprintln!("{url}: {}", error.user_message);
        }
    });
    bus.subscribe(|event| println!("{}", serde_json::to_string(event).unwrap_or_default()));

    let rate_limit = RateLimit {
        requests: 2,
        window_ms: 1_000,
    };
    let google = ApiService::with_event_bus(
        ServiceOptions {
            rate_limit,
            ..ServiceOptions::with_base_url(GOOGLE_BOOKS_BASE_URL)
        },
        Arc::clone(&bus),
    )?;
    let open_library = ApiService::with_event_bus(
        ServiceOptions {
            rate_limit,
            ..ServiceOptions::with_base_url(OPEN_LIBRARY_BASE_URL)
        },
        Arc::clone(&bus),
    )?;

    let (a, b) = tokio::join!(
        google.get_with_query("/volumes", &[("q", "dune")]),
        open_library.get_with_query("/search.json", &[("q", "dune"), ("limit", "1")]),
    );
    println!("google ok={} open library ok={}", a.is_success(), b.is_success());
    println!("{:?}", google.stats());

    Ok(())
}
