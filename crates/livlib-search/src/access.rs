//! Fragment access checks shared by the search and linking services.

use uuid::Uuid;

use livlib_core::{Error, Fragment, FragmentRepository, Result};

/// Load a fragment the actor owns or that is PUBLIC.
pub async fn load_visible(
    fragments: &dyn FragmentRepository,
    actor: Uuid,
    id: Uuid,
) -> Result<Fragment> {
    let fragment = fragments.get(id).await?.ok_or(Error::FragmentNotFound(id))?;
    if !fragment.is_owner_or_public(actor) {
        return Err(forbidden(id));
    }
    Ok(fragment)
}

/// Like [`load_visible`], but also admits UNLISTED fragments.
pub async fn load_readable(
    fragments: &dyn FragmentRepository,
    actor: Uuid,
    id: Uuid,
) -> Result<Fragment> {
    let fragment = fragments.get(id).await?.ok_or(Error::FragmentNotFound(id))?;
    if !fragment.is_readable_by(actor) {
        return Err(forbidden(id));
    }
    Ok(fragment)
}

fn forbidden(id: Uuid) -> Error {
    Error::Forbidden(format!("fragment {} belongs to another user", id))
}
