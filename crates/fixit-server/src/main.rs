use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use fixit_api::auth::{self, AppState, AppStateInner};
use fixit_api::media::{self, LocalMediaStore, MAX_MEDIA_SIZE};
use fixit_api::middleware::require_auth;
use fixit_api::services::{DbReputation, LogNotifier, MailApiNotifier, Notifier, Services};
use fixit_api::{comments, lifecycle, moderation, suspension, users};
use fixit_db::Database;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixit_server=debug,fixit_api=debug,fixit_db=info,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("FIXIT_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: FIXIT_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }

    let db_path = PathBuf::from(env_or("FIXIT_DB_PATH", "fixit.db"));
    let host = env_or("FIXIT_HOST", "0.0.0.0");
    let port: u16 = env_or("FIXIT_PORT", "3000").parse()?;
    let media_dir = PathBuf::from(env_or("FIXIT_MEDIA_DIR", "./uploads"));
    let public_url = env_or("FIXIT_PUBLIC_URL", &format!("http://localhost:{}", port));

    // Storage
    let db = Arc::new(Database::open(&db_path)?);

    if let (Ok(username), Ok(password)) = (
        std::env::var("FIXIT_ADMIN_USERNAME"),
        std::env::var("FIXIT_ADMIN_PASSWORD"),
    ) {
        auth::seed_admin(&db, &username, &password)
            .map_err(|e| anyhow::anyhow!("admin seed failed: {}", e))?;
    }

    // Collaborators
    let notifier: Arc<dyn Notifier> = match std::env::var("FIXIT_MAIL_API_KEY") {
        Ok(api_key) if !api_key.trim().is_empty() => {
            let mut mail = MailApiNotifier::new(
                api_key,
                env_or("FIXIT_MAIL_FROM", "no-reply@fixit.local"),
                env_or("FIXIT_MAIL_FROM_NAME", "FixIt"),
            );
            if let Ok(api_url) = std::env::var("FIXIT_MAIL_API_URL") {
                mail = mail.with_api_url(api_url);
            }
            info!("Outbound mail enabled");
            Arc::new(mail)
        }
        _ => {
            warn!("FIXIT_MAIL_API_KEY not set, notices will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let services = Services {
        notifier,
        reputation: Arc::new(DbReputation::new(db.clone())),
        media: Arc::new(LocalMediaStore::new(media_dir, public_url).await?),
    };

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        services,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/health", get(health))
        .route("/media/{id}", get(media::download_media));

    let member_routes = Router::new()
        .route(
            "/media",
            post(media::upload_media).layer(DefaultBodyLimit::max(MAX_MEDIA_SIZE)),
        )
        .route("/reports", post(lifecycle::create_report).get(lifecycle::list_reports))
        .route("/reports/mine", get(lifecycle::my_reports))
        .route("/reports/summary", get(lifecycle::report_summary))
        .route("/reports/resolved", get(lifecycle::list_resolved))
        .route("/reports/resolved/count", get(lifecycle::count_resolved))
        .route(
            "/reports/{id}",
            get(lifecycle::get_report)
                .put(lifecycle::update_report)
                .delete(lifecycle::delete_report),
        )
        .route("/users/{id}/reports", get(lifecycle::reports_by_owner))
        .route("/reports/{id}/comments", post(comments::add_comment))
        .route(
            "/reports/{id}/comments/{comment_id}",
            put(comments::edit_comment).delete(comments::delete_comment),
        )
        .route("/reports/{id}/flags", post(moderation::flag_report));

    let admin_routes = Router::new()
        .route("/admin/reports/awaiting", get(lifecycle::awaiting_reports))
        .route("/admin/reports/flagged", get(moderation::flagged_reports))
        .route("/admin/reports/batch-delete", post(moderation::batch_remove_reports))
        .route("/admin/reports/{id}/approve", post(lifecycle::approve_report))
        .route("/admin/reports/{id}/reject", post(lifecycle::reject_report))
        .route("/admin/reports/{id}/verify", post(lifecycle::verify_report))
        .route("/admin/reports/{id}/resolve", post(lifecycle::resolve_report))
        .route("/admin/reports/{id}/status", put(lifecycle::update_report_status))
        .route("/admin/reports/{id}", delete(moderation::remove_report))
        .route("/admin/reports/{id}/flags", delete(moderation::dismiss_all_flags))
        .route(
            "/admin/reports/{id}/flags/{user_id}",
            delete(moderation::dismiss_flag),
        )
        .route("/admin/users", get(users::get_users))
        .route("/admin/users/stats", get(users::get_user_stats))
        .route("/admin/users/suspended", get(users::get_suspended_users))
        .route("/admin/users/{id}", get(users::get_user))
        .route("/admin/users/{id}/suspend", post(suspension::suspend_user))
        .route("/admin/users/{id}/unsuspend", post(suspension::unsuspend_user));

    let protected_routes = member_routes
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("FixIt server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
