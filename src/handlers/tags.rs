use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_login::AuthSession;
use minijinja::context;
use serde::Deserialize;

use crate::{
    app::AppState,
    db::UnitOfWork,
    models::{Article, Tag},
    utils::Path,
    Error,
};

#[derive(Debug, Default, Deserialize)]
pub struct TagQuery {
    page: Option<i64>,
}

pub async fn handler_tag_list(
    State(state): State<Arc<AppState>>,
    auth_session: AuthSession<AppState>,
    Path(id): Path<i64>,
    mut uow: UnitOfWork,
    Query(query): Query<TagQuery>,
) -> Result<Response, Error> {
    let tag = Tag::get_by_id(&mut uow, id)
        .await?
        .ok_or(Error::NotFound("tag"))?;
    let page = Article::list_by_tag(&mut uow, tag.id, query.page.unwrap_or(1)).await?;
    Ok(state
        .render_template(
            "tag_list.html",
            auth_session.user.as_ref(),
            context! {
                tag => tag,
                page => page,
            },
        )?
        .into_response())
}
