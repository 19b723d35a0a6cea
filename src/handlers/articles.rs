use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use axum_login::AuthSession;
use minijinja::context;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tower_sessions::Session;
use validator::{Validate, ValidationErrors};

use crate::{
    app::AppState,
    auth::CurrentUser,
    db::UnitOfWork,
    listing::ListQuery,
    models::{Article, ArticleDetails, Category, User},
    notify::{notify, take_notification, NotificationKind},
    policy::{can_edit, require_can_edit},
    utils::{add_error, field_errors, Path},
    Error,
};

const LIST_URL: &str = "/Article/List";

#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ArticleForm {
    #[validate(length(min = 1, max = 50, message = "The title must be 1 to 50 characters long."))]
    pub title: String,
    #[validate(length(min = 1, message = "The content is required."))]
    pub content: String,
    pub category_id: String,
    pub tags: String,
}

impl ArticleForm {
    fn trimmed(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            content: if self.content.trim().is_empty() {
                String::new()
            } else {
                self.content
            },
            ..self
        }
    }
}

impl From<&ArticleDetails> for ArticleForm {
    fn from(article: &ArticleDetails) -> Self {
        Self {
            title: article.title.clone(),
            content: article.content.clone(),
            category_id: article.category_id.to_string(),
            tags: article.tags_text(),
        }
    }
}

// Checks the form, returning the id of the chosen category.
async fn validate_article(conn: &mut SqliteConnection, form: &ArticleForm) -> Result<i64, Error> {
    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    let category_id = match form.category_id.trim().parse::<i64>() {
        Ok(id) => Category::get_by_id(conn, id).await?.map(|category| category.id),
        Err(_) => None,
    };
    if category_id.is_none() {
        add_error(&mut errors, "category_id", "Please choose a category.");
    }

    match category_id {
        Some(id) if errors.errors().is_empty() => Ok(id),
        _ => Err(errors.into()),
    }
}

pub(crate) async fn create_article(
    conn: &mut SqliteConnection,
    author: &User,
    form: &ArticleForm,
) -> Result<i64, Error> {
    let category_id = validate_article(&mut *conn, form).await?;
    Article::create(
        conn,
        author.id,
        category_id,
        &form.title,
        &form.content,
        &form.tags,
    )
    .await
}

// The article, if it exists and `user` may change it.
pub(crate) async fn load_editable(
    conn: &mut SqliteConnection,
    user: &User,
    id: i64,
) -> Result<ArticleDetails, Error> {
    let article = Article::get_details(conn, id)
        .await?
        .ok_or(Error::NotFound("article"))?;
    require_can_edit(user, &article)?;
    Ok(article)
}

// Same checks as `load_editable`, without the joins the pages need.
async fn load_changeable(
    conn: &mut SqliteConnection,
    user: &User,
    id: i64,
) -> Result<Article, Error> {
    let article = Article::get_by_id(conn, id)
        .await?
        .ok_or(Error::NotFound("article"))?;
    require_can_edit(user, &article)?;
    Ok(article)
}

pub(crate) async fn edit_article(
    conn: &mut SqliteConnection,
    user: &User,
    id: i64,
    form: &ArticleForm,
) -> Result<(), Error> {
    load_changeable(&mut *conn, user, id).await?;
    let category_id = validate_article(&mut *conn, form).await?;
    Article::update(conn, id, category_id, &form.title, &form.content, &form.tags).await
}

pub(crate) async fn delete_article(
    conn: &mut SqliteConnection,
    user: &User,
    id: i64,
) -> Result<(), Error> {
    load_changeable(&mut *conn, user, id).await?;
    Article::delete(conn, id).await
}

async fn render_form(
    state: &AppState,
    user: &User,
    conn: &mut SqliteConnection,
    id: Option<i64>,
    form: &ArticleForm,
    errors: Option<&ValidationErrors>,
) -> Result<Response, Error> {
    let categories = Category::get_all(conn).await?;
    Ok(state
        .render_template(
            "article_form.html",
            Some(user),
            context! {
                article_id => id,
                form => form,
                categories => categories,
                errors => errors.map(field_errors).unwrap_or_default(),
            },
        )?
        .into_response())
}

pub async fn handler_article_index() -> Redirect {
    Redirect::to(LIST_URL)
}

pub async fn handler_article_list(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession<AppState>,
    session: Session,
    mut uow: UnitOfWork,
    Query(query): Query<ListQuery>,
) -> Result<Response, Error> {
    let params = query.normalize();
    let page = Article::list(&mut uow, &params).await?;
    let editable_ids: Vec<i64> = match auth_session.user.as_ref() {
        Some(user) => page
            .items
            .iter()
            .filter(|article| can_edit(user, *article))
            .map(|article| article.id)
            .collect(),
        None => vec![],
    };
    Ok(state
        .render_template(
            "article_list.html",
            auth_session.user.as_ref(),
            context! {
                page => page,
                editable_ids => editable_ids,
                current_filter => params.filter,
                sort_order => params.sort.key(),
                title_sort => params.sort.title_toggle(),
                author_sort => params.sort.author_toggle(),
                notification => take_notification(&session).await?,
            },
        )?
        .into_response())
}

pub async fn handler_article_details(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession<AppState>,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let article = Article::get_details(&mut uow, id)
        .await?
        .ok_or(Error::NotFound("article"))?;
    let editable = auth_session
        .user
        .as_ref()
        .is_some_and(|user| can_edit(user, &article));
    Ok(state
        .render_template(
            "article_details.html",
            auth_session.user.as_ref(),
            context! {
                article => article,
                can_edit => editable,
            },
        )?
        .into_response())
}

pub async fn handler_article_create_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    render_form(&state, &user, &mut uow, None, &ArticleForm::default(), None).await
}

pub async fn handler_article_create_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<ArticleForm>,
) -> Result<Response, Error> {
    let form = form.trimmed();
    match create_article(&mut uow, &user, &form).await {
        Ok(_) => {
            uow.commit().await?;
            notify(&session, NotificationKind::Success, "Article created.").await?;
            Ok(Redirect::to(LIST_URL).into_response())
        }
        Err(Error::Validation(errors)) => {
            render_form(&state, &user, &mut uow, None, &form, Some(&errors)).await
        }
        Err(err) => Err(err),
    }
}

pub async fn handler_article_edit_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let article = load_editable(&mut uow, &user, id).await?;
    let form = ArticleForm::from(&article);
    render_form(&state, &user, &mut uow, Some(id), &form, None).await
}

pub async fn handler_article_edit_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<ArticleForm>,
) -> Result<Response, Error> {
    let form = form.trimmed();
    match edit_article(&mut uow, &user, id, &form).await {
        Ok(_) => {
            uow.commit().await?;
            notify(&session, NotificationKind::Info, "Article edited.").await?;
            Ok(Redirect::to(LIST_URL).into_response())
        }
        Err(Error::Validation(errors)) => {
            render_form(&state, &user, &mut uow, Some(id), &form, Some(&errors)).await
        }
        Err(err) => Err(err),
    }
}

pub async fn handler_article_delete_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let article = load_editable(&mut uow, &user, id).await?;
    Ok(state
        .render_template(
            "article_delete.html",
            Some(&user),
            context! { article => article },
        )?
        .into_response())
}

pub async fn handler_article_delete_post(
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    delete_article(&mut uow, &user, id).await?;
    uow.commit().await?;
    notify(&session, NotificationKind::Warning, "Article deleted.").await?;
    Ok(Redirect::to(LIST_URL).into_response())
}
