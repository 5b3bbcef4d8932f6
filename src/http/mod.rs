//! REST surface.
//!
//! Every route is a thin bridge onto the method dispatcher: path, query and
//! body become `params`, the bearer token rides along as the request token,
//! and method error codes become status codes.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod error;
pub mod routes;

use crate::ipc::AppState;

pub type SharedState = Arc<Mutex<AppState>>;

pub fn shared(state: AppState) -> SharedState {
    Arc::new(Mutex::new(state))
}

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/health", get(routes::health_handler))
        .route("/auth/register", post(routes::register_handler))
        .route("/auth/login", post(routes::login_handler))
        .route("/auth/me", get(routes::me_handler))
        .route(
            "/classes",
            get(routes::list_classes_handler).post(routes::create_class_handler),
        )
        .route(
            "/classes/:id",
            get(routes::get_class_handler)
                .put(routes::update_class_handler)
                .delete(routes::delete_class_handler),
        )
        .route(
            "/students",
            get(routes::list_students_handler).post(routes::create_student_handler),
        )
        .route(
            "/students/:id",
            get(routes::get_student_handler)
                .put(routes::update_student_handler)
                .delete(routes::delete_student_handler),
        )
        .route(
            "/attendance",
            get(routes::get_attendance_handler)
                .post(routes::save_attendance_handler)
                .delete(routes::clear_attendance_handler),
        )
        .route("/dashboard", get(routes::dashboard_handler))
        .route("/reports/student", get(routes::student_reports_handler))
        .route("/reports/date", get(routes::date_reports_handler));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, address: SocketAddr) -> anyhow::Result<()> {
    let app = router(shared(state));

    info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        } else {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
