//! Preview server acting as the host document, with live reload

use anyhow::Result;
use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::{Request, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;

use crate::commands::render::document;
use crate::config::ClientConfig;
use crate::content::StoreEvent;
use crate::fetch::HttpFetcher;
use crate::host::Document;
use crate::navigation::{normalize_path, route_link, Navigator};
use crate::template::MountedView;
use crate::Kontentsu;

/// Live reload script injected into every served page
const LIVE_RELOAD_SCRIPT: &str = r#"
<script>
(function() {
    var ws = new WebSocket('ws://' + location.host + '/__livereload');
    ws.onmessage = function(msg) {
        if (msg.data === 'reload') {
            location.reload();
        }
    };
    ws.onclose = function() {
        console.log('Live reload disconnected. Attempting to reconnect...');
        setTimeout(function() { location.reload(); }, 1000);
    };
})();
</script>
</body>
"#;

struct PreviewState {
    app: Kontentsu,
    doc: Arc<Document>,
    navigator: Navigator,
}

/// Start the preview server
pub async fn start(config: ClientConfig, ip: &str, port: u16, open: bool) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout())?);
    let doc = Arc::new(Document::new());
    let app = Kontentsu::new(config, fetcher, doc.clone());
    let navigator = app.start("/");

    let state = Arc::new(PreviewState {
        app,
        doc,
        navigator,
    });
    let router = router(state);

    // Parse address - handle "localhost" specially
    let bind_ip = if ip == "localhost" { "127.0.0.1" } else { ip };
    let addr: SocketAddr = format!("{}:{}", bind_ip, port).parse()?;

    let url = format!("http://{}:{}", ip, port);
    println!("Preview running at {}", url);
    println!("Press Ctrl+C to stop.");

    if open {
        if let Err(e) = open_browser(&url) {
            tracing::warn!("Failed to open browser: {}", e);
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn router(state: Arc<PreviewState>) -> Router {
    Router::new()
        .route("/__livereload", get(livereload_handler))
        .fallback(page_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// WebSocket handler for live reload
async fn livereload_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<PreviewState>>,
) -> impl IntoResponse {
    let views = state.app.mount().subscribe();
    ws.on_upgrade(move |socket| handle_livereload_socket(socket, views))
}

/// Push `reload` to the browser every time a new unit mounts
async fn handle_livereload_socket(
    mut socket: WebSocket,
    mut views: watch::Receiver<Option<Arc<MountedView>>>,
) {
    tracing::debug!("Live reload client connected");
    views.borrow_and_update();

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                if socket.send(Message::Text("reload".to_string())).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("Live reload client disconnected");
}

/// Navigate to the requested path and serve whatever is mounted
async fn page_handler(State(state): State<Arc<PreviewState>>, request: Request<Body>) -> Response {
    let path = request.uri().path();
    if is_asset_path(path) {
        tracing::debug!("Not a page: {}", path);
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    let Some(event) = route_link(path) else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let moved = normalize_path(&event.path) != normalize_path(&state.navigator.location());
    let mut views = state.app.mount().subscribe();
    let mounted = views.borrow_and_update().is_some();
    if moved || !mounted {
        let mut template_failures = state.app.loader().subscribe_failures();
        template_failures.borrow_and_update();
        let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();
        let subscription = state.app.store().subscribe(move |event| {
            if let StoreEvent::Failed { .. } = event {
                let _ = failed_tx.send(());
            }
        });

        if moved {
            tracing::info!("Navigating to {}", event.path);
            state.navigator.navigate(event.path);
        }

        // content and template are fetched one after the other
        let bound = state.app.config().fetch_timeout() * 2;
        let settled = tokio::time::timeout(bound, async {
            tokio::select! {
                _ = views.changed() => {}
                _ = failed_rx.recv() => {}
                _ = template_failures.changed() => {}
            }
        })
        .await;
        if settled.is_err() {
            tracing::warn!("Timed out waiting for {}", path);
        }
        state.app.store().unsubscribe(subscription);
    }

    let body = state
        .app
        .mount()
        .current()
        .map(|view| view.html.clone())
        .unwrap_or_default();
    Html(inject_live_reload(&document(state.doc.title().as_deref(), &body))).into_response()
}

/// Whether a request path names a file (`/favicon.ico`, `/app.js`) rather than a page
fn is_asset_path(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()),
        None => false,
    }
}

/// Inject live reload script into HTML content
fn inject_live_reload(html: &str) -> String {
    if html.contains("</body>") {
        html.replace("</body>", LIVE_RELOAD_SCRIPT)
    } else {
        format!("{}{}", html, LIVE_RELOAD_SCRIPT)
    }
}

/// Open a URL in the default browser
fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/c", "start", url])
            .spawn()?;
    }

    Ok(())
}
