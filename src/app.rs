use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use axum_login::{
    tower_sessions::{cookie::time::Duration, Expiry, MemoryStore, SessionManagerLayer},
    AuthManagerLayerBuilder,
};
use comrak::{markdown_to_html_with_plugins, plugins::syntect, Options, Plugins};
use minijinja::{context, Environment, Value};
use sqlx::SqlitePool;
use tower_http::{
    services::ServeDir,
    trace::{self, TraceLayer},
};
use tower_sessions::cookie::Key;
use tracing::{error, info, Level};

use crate::{
    auth::admin_required,
    config::Config,
    db,
    error::{Error, ErrorPage},
    handlers::*,
    models::{create_tables, Role, User},
};

const TEMPLATES_DIR: &str = "templates";
const STATIC_DIR: &str = "static";

// AppState is used to pass the global states to the handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub env: Environment<'static>,
    pub db: SqlitePool,
}

impl AppState {
    pub async fn new(config_path: &str) -> Result<Self, Error> {
        info!("parsing config file {}", config_path);
        let config = Config::new(config_path)?;

        info!("connecting to the database");
        let db = db::connect(config.database_url(), config.database_max_connections()).await?;
        Self::with_db(config, db).await
    }

    async fn with_db(config: Config, db: SqlitePool) -> Result<Self, Error> {
        info!("initializing the database");
        // create the tables if they don't exist.
        create_tables(&db).await?;
        Role::ensure_defaults(&db).await?;
        User::ensure_admin(
            &db,
            &config.admin_email(),
            &config.admin_full_name(),
            config.admin_password(),
        )
        .await?;

        info!("initializing the environment");
        let env = Self::build_env(&config)?;

        Ok(Self { config, env, db })
    }

    fn build_env(config: &Config) -> Result<Environment<'static>, Error> {
        let mut env = Environment::new();
        // iterate the templates directory and add all the templates.
        for entry in std::fs::read_dir(TEMPLATES_DIR)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let file_name = path.file_name().unwrap_or_default().to_string_lossy().into_owned();
            let template_content = std::fs::read_to_string(path)?;
            env.add_template_owned(file_name, template_content)?;
        }
        // load the global variables into the environment.
        env.add_global("config", Value::from_object(config.clone()));
        // load the embedded functions into the environment.
        let theme = config.code_syntax_highlight_theme();
        env.add_filter("md_to_html", move |md_content: &str| {
            Self::md_to_html(&theme, md_content)
        });
        env.add_filter("truncate_str", |value: &str, max_length: usize| {
            if value.chars().count() > max_length {
                let mut truncated = value.chars().take(max_length).collect::<String>();
                truncated.push('…');
                truncated
            } else {
                value.to_string()
            }
        });
        Ok(env)
    }

    fn md_to_html(theme: &str, md_content: &str) -> String {
        // enable some extension options.
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.autolink = true;
        options.extension.table = true;
        // enable the syntax highlight adapter.
        let mut plugins = Plugins::default();
        let adapter = syntect::SyntectAdapterBuilder::new().theme(theme).build();
        plugins.render.codefence_syntax_highlighter = Some(&adapter);

        markdown_to_html_with_plugins(md_content, &options, &plugins)
    }

    pub fn render_template(
        &self,
        template_name: &str,
        current_user: Option<&User>,
        context: Value,
    ) -> Result<Html<String>, Error> {
        let template = self.env.get_template(template_name)?;
        Ok(Html(template.render(context! {
            current_user => current_user,
            ..context,
        })?))
    }
}

// Replaces the empty body of an error response with the error page.
async fn render_error_page(State(state): State<Arc<AppState>>, response: Response) -> Response {
    let page = match response.extensions().get::<ErrorPage>() {
        Some(page) => page.clone(),
        None => return response,
    };
    let status = response.status();
    match state.render_template(
        "error.html",
        None,
        context! {
            title => status.as_u16(),
            message => page.message,
        },
    ) {
        Ok(html) => (status, html).into_response(),
        Err(err) => {
            error!("failed rendering the error page: {:?}", err);
            status.into_response()
        }
    }
}

// Every route of the panel, with the session, auth, error page and tracing layers.
fn router(state: AppState) -> Router {
    // session layer resident in memory.
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::days(
            state.config.admin_inactive_expiry_days(),
        )))
        .with_signed(Key::generate());
    // authentication layer
    let auth_layer = AuthManagerLayerBuilder::new(state.clone(), session_layer).build();
    let state = Arc::new(state);

    // the whole group is admin only.
    let admin_router = Router::new()
        .route("/Category", get(handler_category_index))
        .route("/Category/List", get(handler_category_list))
        .route(
            "/Category/Create",
            get(handler_category_create_get).post(handler_category_create_post),
        )
        .route(
            "/Category/Edit",
            get(handler_missing_id).post(handler_missing_id),
        )
        .route(
            "/Category/Edit/:id",
            get(handler_category_edit_get).post(handler_category_edit_post),
        )
        .route(
            "/Category/Delete",
            get(handler_missing_id).post(handler_missing_id),
        )
        .route(
            "/Category/Delete/:id",
            get(handler_category_delete_get).post(handler_category_delete_post),
        )
        .route("/User", get(handler_user_index))
        .route("/User/List", get(handler_user_list))
        .route("/User/Edit", get(handler_missing_id).post(handler_missing_id))
        .route(
            "/User/Edit/:id",
            get(handler_user_edit_get).post(handler_user_edit_post),
        )
        .route(
            "/User/Delete",
            get(handler_missing_id).post(handler_missing_id),
        )
        .route(
            "/User/Delete/:id",
            get(handler_user_delete_get).post(handler_user_delete_post),
        )
        .route_layer(middleware::from_fn(admin_required));

    let article_router = Router::new()
        .route("/", get(handler_article_index))
        .route("/Article", get(handler_article_index))
        .route("/Article/List", get(handler_article_list))
        .route("/Article/Details", get(handler_missing_id))
        .route("/Article/Details/:id", get(handler_article_details))
        .route(
            "/Article/Create",
            get(handler_article_create_get).post(handler_article_create_post),
        )
        .route(
            "/Article/Edit",
            get(handler_missing_id).post(handler_missing_id),
        )
        .route(
            "/Article/Edit/:id",
            get(handler_article_edit_get).post(handler_article_edit_post),
        )
        .route(
            "/Article/Delete",
            get(handler_missing_id).post(handler_missing_id),
        )
        .route(
            "/Article/Delete/:id",
            get(handler_article_delete_get).post(handler_article_delete_post),
        )
        .route("/Tag/List", get(handler_missing_id))
        .route("/Tag/List/:id", get(handler_tag_list));

    let account_router = Router::new()
        .route(
            "/Account/Login",
            get(handler_login_get).post(handler_login_post),
        )
        .route(
            "/Account/Register",
            get(handler_register_get).post(handler_register_post),
        )
        .route(
            "/Account/Logout",
            get(handler_logout).post(handler_logout),
        );

    Router::new()
        .fallback(handler_404)
        // serve the static files
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .route("/ping", get(handler_ping))
        .merge(article_router)
        .merge(account_router)
        .merge(admin_router)
        .layer(middleware::map_response_with_state(
            state.clone(),
            render_error_page,
        ))
        .layer(auth_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

pub struct App {
    state: AppState,
}

impl App {
    pub async fn new(config_path: &str) -> Result<Self, Error> {
        Ok(Self {
            state: AppState::new(config_path).await?,
        })
    }

    pub async fn serve(&self) -> Result<(), Error> {
        let app = router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.state.config.server_url()).await?;
        info!("listening on {}", listener.local_addr()?);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
