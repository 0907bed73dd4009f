//! Dashboard HTTP server
//!
//! Serves page layouts as JSON and the post-load widget data endpoint.
//! A background task owns periodic cache maintenance.

use chrono::Utc;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode, header};
use serde_json::{Map, Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::cache::{CacheContext, SWEEP_INTERVAL};
use crate::config::Config;
use crate::error::{Error, Result, WidgetError};
use crate::widgets::{Widget, WidgetContext, WidgetRegistry};

/// Memory-cache duration for widgets without a `cache` code
const DEFAULT_DATA_CACHE: &str = "1m";

/// Everything a request handler needs
pub struct AppState {
    pub config_path: PathBuf,
    pub registry: WidgetRegistry,
    pub cache: Arc<CacheContext>,
}

/// Bind to `host:port` and serve until Ctrl-C.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| Error::Server(format!("Unable to resolve {}:{}", host, port)))?;

    let scheduler = spawn_scheduler(Arc::clone(&state.cache), SWEEP_INTERVAL);

    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(Arc::clone(&state), req)))
        }
    });

    let server = hyper::Server::try_bind(&addr)
        .map_err(|e| Error::Server(format!("Unable to bind {}: {}", addr, e)))?
        .serve(make_svc);
    log::info!("Listening on http://{}", addr);

    let result = server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await;

    scheduler.abort();
    result.map_err(|e| Error::Server(e.to_string()))
}

/// Run cache maintenance every `period`.
pub fn spawn_scheduler(cache: Arc<CacheContext>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log::info!("[Task] Cache cleanup");
            cache.clear_expired(Utc::now().timestamp());
        }
    })
}

fn json_response(status: StatusCode, body: &Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    json_response(status, &json!({ "error": message.into() }))
}

fn query_param(req: &Request<Body>, name: &str) -> Option<String> {
    req.uri().query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == name).then(|| value.to_string())
    })
}

/// Route one request
pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> std::result::Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    log::debug!("{} {}", method, path);

    let response = match (&method, segments.as_slice()) {
        (&Method::GET, []) => redirect_to_first_page(&state),
        (&Method::GET, [page]) => page_layout(&state, page),
        (&Method::POST, ["widget", widget_type, "data"]) => {
            let widget_type = widget_type.to_string();
            widget_data_request(&state, &widget_type, req).await
        }
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

fn load_config(state: &AppState) -> std::result::Result<Config, Response<Body>> {
    Config::load_from(&state.config_path).map_err(|e| {
        log::error!("{}", e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}

fn redirect_to_first_page(state: &AppState) -> Response<Body> {
    let config = match load_config(state) {
        Ok(config) => config,
        Err(response) => return response,
    };

    match config.pages.first() {
        Some(page) => {
            let location = format!("/{}", page.slug());
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            if let Ok(value) = header::HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            response
        }
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No Pages Defined: check '{}'", state.config_path.display()),
        ),
    }
}

fn page_layout(state: &AppState, page: &str) -> Response<Body> {
    let config = match load_config(state) {
        Ok(config) => config,
        Err(response) => return response,
    };

    let Some(page_config) = config.find_page(page) else {
        return error_response(StatusCode::NOT_FOUND, "Page Not Found");
    };

    let body = json!({
        "name": page_config.name,
        "slug": page,
        "columns": page_config.columns,
        "pages": config.pages.iter().map(|p| json!({"name": p.name, "slug": p.slug()})).collect::<Vec<_>>(),
        "settings": { "hide_errors": config.settings.hide_errors },
        "version": env!("CARGO_PKG_VERSION"),
    });
    json_response(StatusCode::OK, &body)
}

async fn widget_data_request(state: &AppState, widget_type: &str, req: Request<Body>) -> Response<Body> {
    let widget_id = query_param(&req, "widget_id");
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let params = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null),
        Err(e) => {
            log::warn!("Failed to read request body: {}", e);
            Value::Null
        }
    };

    let ctx = WidgetContext::new(Arc::clone(&state.cache), user_agent);
    let data = widget_data(&state.registry, &ctx, widget_type, params, widget_id).await;
    json_response(StatusCode::OK, &data)
}

/// Build the widget, fetch (or recall) its data and tag it with the id.
///
/// Errors never escape: they come back as an `error` field.
pub async fn widget_data(
    registry: &WidgetRegistry,
    ctx: &WidgetContext,
    widget_type: &str,
    params: Value,
    widget_id: Option<String>,
) -> Value {
    let params = match params {
        Value::Object(mut map) => match map.remove("params") {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        _ => Value::Object(Map::new()),
    };

    let mut data = Map::new();
    let result = match registry.build(widget_type, params) {
        Ok(widget) => fetch_widget(widget.as_ref(), ctx).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(Value::Object(fields)) => data.extend(fields),
        Ok(_) => {}
        Err(e) => {
            match &e {
                WidgetError::Fetch(fetch) => {
                    log::warn!("[{}] Fetch failed for {}: {}", widget_type, fetch.url(), fetch)
                }
                _ => log::warn!("[{}] {}", widget_type, e),
            }
            data.insert("error".to_string(), Value::from(e.to_string()));
        }
    }

    data.insert(
        "widget_id".to_string(),
        widget_id.map(Value::from).unwrap_or(Value::Null),
    );
    Value::Object(data)
}

/// Serve from the memory cache when the widget opts in, else fetch and
/// remember the result.
pub async fn fetch_widget(widget: &dyn Widget, ctx: &WidgetContext) -> std::result::Result<Value, WidgetError> {
    let key = widget.cache_key();
    if let Some(key) = &key {
        ctx.cache().memory.init_bucket(widget.kind().cache_type);
        if let Some(hit) = ctx.cache_get(widget, key) {
            return Ok(hit);
        }
    }

    let data = widget.fetch_data(ctx).await?;

    if let Some(key) = key
        && data.is_object()
    {
        let code = widget.cache_duration().unwrap_or(DEFAULT_DATA_CACHE);
        ctx.cache_set_short(widget, &key, data.clone(), code)?;
    }
    Ok(data)
}
