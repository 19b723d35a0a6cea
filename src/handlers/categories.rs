use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tower_sessions::Session;
use validator::{Validate, ValidationErrors};

use crate::{
    app::AppState,
    auth::CurrentUser,
    db::UnitOfWork,
    models::{Category, User},
    notify::{notify, take_notification, NotificationKind},
    utils::{add_error, field_errors, Path},
    Error,
};

const LIST_URL: &str = "/Category/List";

#[derive(Clone, Debug, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct CategoryForm {
    #[validate(length(min = 1, max = 20, message = "The name must be 1 to 20 characters long."))]
    pub name: String,
}

impl CategoryForm {
    fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
        }
    }
}

// Validates the form and writes it, `id` is `None` for a new category.
pub(crate) async fn save_category(
    conn: &mut SqliteConnection,
    id: Option<i64>,
    form: &CategoryForm,
) -> Result<i64, Error> {
    let mut errors = form.validate().err().unwrap_or_else(ValidationErrors::new);
    if !form.name.is_empty() && Category::name_taken(&mut *conn, &form.name, id).await? {
        add_error(&mut errors, "name", "A category with this name already exists.");
    }
    if !errors.errors().is_empty() {
        return Err(errors.into());
    }

    match id {
        Some(id) => {
            Category::rename(conn, id, &form.name).await?;
            Ok(id)
        }
        None => Category::insert(conn, &form.name).await,
    }
}

fn render_form(
    state: &AppState,
    user: &User,
    id: Option<i64>,
    form: &CategoryForm,
    errors: Option<&ValidationErrors>,
) -> Result<Response, Error> {
    Ok(state
        .render_template(
            "category_form.html",
            Some(user),
            context! {
                category_id => id,
                form => form,
                errors => errors.map(field_errors).unwrap_or_default(),
            },
        )?
        .into_response())
}

async fn load_category(conn: &mut SqliteConnection, id: i64) -> Result<Category, Error> {
    Category::get_by_id(conn, id)
        .await?
        .ok_or(Error::NotFound("category"))
}

pub async fn handler_category_index() -> Redirect {
    Redirect::to(LIST_URL)
}

pub async fn handler_category_list(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: Session,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let categories = Category::get_all_with_count(&mut uow).await?;
    Ok(state
        .render_template(
            "category_list.html",
            Some(&user),
            context! {
                categories => categories,
                notification => take_notification(&session).await?,
            },
        )?
        .into_response())
}

pub async fn handler_category_create_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, Error> {
    render_form(&state, &user, None, &CategoryForm::default(), None)
}

pub async fn handler_category_create_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<CategoryForm>,
) -> Result<Response, Error> {
    let form = form.trimmed();
    match save_category(&mut uow, None, &form).await {
        Ok(_) => {
            uow.commit().await?;
            notify(&session, NotificationKind::Success, "Category created.").await?;
            Ok(Redirect::to(LIST_URL).into_response())
        }
        Err(Error::Validation(errors)) => render_form(&state, &user, None, &form, Some(&errors)),
        Err(err) => Err(err),
    }
}

pub async fn handler_category_edit_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let category = load_category(&mut uow, id).await?;
    let form = CategoryForm {
        name: category.name,
    };
    render_form(&state, &user, Some(id), &form, None)
}

pub async fn handler_category_edit_post(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
    Form(form): Form<CategoryForm>,
) -> Result<Response, Error> {
    load_category(&mut uow, id).await?;
    let form = form.trimmed();
    match save_category(&mut uow, Some(id), &form).await {
        Ok(_) => {
            uow.commit().await?;
            notify(&session, NotificationKind::Info, "Category edited.").await?;
            Ok(Redirect::to(LIST_URL).into_response())
        }
        Err(Error::Validation(errors)) => {
            render_form(&state, &user, Some(id), &form, Some(&errors))
        }
        Err(err) => Err(err),
    }
}

pub async fn handler_category_delete_get(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    let category = load_category(&mut uow, id).await?;
    Ok(state
        .render_template(
            "category_delete.html",
            Some(&user),
            context! { category => category },
        )?
        .into_response())
}

pub async fn handler_category_delete_post(
    Path(id): Path<i64>,
    session: Session,
    mut uow: UnitOfWork,
) -> Result<Response, Error> {
    load_category(&mut uow, id).await?;
    Category::delete(&mut uow, id).await?;
    uow.commit().await?;
    notify(&session, NotificationKind::Warning, "Category deleted.").await?;
    Ok(Redirect::to(LIST_URL).into_response())
}
