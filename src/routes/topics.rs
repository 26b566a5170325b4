use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Topic Router
///
/// Reads are public in the default policy table; create, update and delete require an identity
/// and clear the listing cache on success.
pub fn topic_routes() -> Router<AppState> {
    Router::new()
        // GET /topicos?nomeCurso=...&page=...&size=...&sort=...
        // Paged listing, served through the listing cache.
        // POST /topicos
        // Opens a topic authored by the caller.
        .route(
            "/topicos",
            get(handlers::list_topics).post(handlers::create_topic),
        )
        // GET/PUT/DELETE /topicos/{id}
        .route(
            "/topicos/{id}",
            get(handlers::get_topic)
                .put(handlers::update_topic)
                .delete(handlers::delete_topic),
        )
}
