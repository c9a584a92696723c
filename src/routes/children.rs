use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;

use crate::{auth::CurrentUser, error::AppError, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(children_page).post(create))
        .route("/:id", post(update))
        .route("/:id/delete", post(delete))
}

#[derive(Clone)]
struct ChildView {
    id: String,
    nickname: String,
    added: String,
}

#[derive(Template)]
#[template(path = "children/list.html")]
struct ChildrenTemplate {
    children: Vec<ChildView>,
    has_children: bool,
}

async fn children_page(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let children = state
        .children
        .list(&user.uuid)
        .await?
        .into_iter()
        .map(|child| ChildView {
            id: child.id,
            nickname: child.nickname,
            added: child.created_at.format("%Y-%m-%d").to_string(),
        })
        .collect::<Vec<_>>();
    Ok(AskamaTemplateResponse::into_response(ChildrenTemplate {
        has_children: !children.is_empty(),
        children,
    }))
}

#[derive(Deserialize)]
struct ChildForm {
    nickname: String,
}

impl ChildForm {
    fn nickname(&self) -> Result<&str, AppError> {
        let nickname = self.nickname.trim();
        if nickname.is_empty() {
            return Err(AppError::Validation("nickname is required".into()));
        }
        Ok(nickname)
    }
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<ChildForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.children.create(&user.uuid, form.nickname()?).await?;
    Ok(Redirect::to("/children"))
}

async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
    Form(form): Form<ChildForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state
        .children
        .update(&user.uuid, &child_id, form.nickname()?)
        .await?;
    Ok(Redirect::to("/children"))
}

async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(child_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.children.delete(&user.uuid, &child_id).await?;
    Ok(Redirect::to("/children"))
}
