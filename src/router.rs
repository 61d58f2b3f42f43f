//! Maps an inbound request onto a comic store operation.
//!
//! The router performs no socket I/O. Every failure is converted to a
//! status response here, so a session always gets back a well-formed
//! [`Response`] no matter what the request looked like.

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    comic::{Comic, ComicId, SharedStore},
    http::{Request, Response, Status},
};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("malformed target '{0}'")]
    MalformedTarget(String),
    #[error("unsupported method '{0}'")]
    UnsupportedMethod(String),
    #[error("comic {0} not found")]
    NotFound(ComicId),
    #[error("invalid comic payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Routes the request and converts any [`RouteError`] into its status
/// response: malformed targets, unsupported methods, and undecodable
/// payloads are 400s, missing ids are 404s, anything else is a 500.
pub async fn respond(store: &SharedStore, request: &Request) -> Response {
    match dispatch(store, request).await {
        Ok(response) => response,
        Err(err @ (RouteError::MalformedTarget(_) | RouteError::UnsupportedMethod(_))) => {
            bad_request(request, &err.to_string())
        }
        Err(err @ RouteError::Decode(_)) => bad_request(request, &err.to_string()),
        Err(RouteError::NotFound(_)) => not_found(request),
        Err(RouteError::Internal(message)) => {
            warn!(message, "handler failed");
            server_error(request)
        }
    }
}

async fn dispatch(store: &SharedStore, request: &Request) -> Result<Response, RouteError> {
    match request.method.as_str() {
        "GET" => read_comic(store, request, require_id(&request.target)?).await,
        "DELETE" => delete_comic(store, request, require_id(&request.target)?).await,
        "PUT" => match parse_target(&request.target)? {
            Some(id) => update_comic(store, request, id).await,
            None => create_comic(store, request).await,
        },
        "POST" => match parse_target(&request.target)? {
            // POST carries no id; a target with an id segment is malformed.
            Some(_) => Err(RouteError::MalformedTarget(request.target.clone())),
            None => create_comic(store, request).await,
        },
        other => Err(RouteError::UnsupportedMethod(other.to_string())),
    }
}

/// Target grammar: `/comic` means "no id present", `/comic/<digits>`
/// addresses one record. Id presence is an explicit `Option`, never a
/// sentinel value that could collide with a real id.
fn parse_target(target: &str) -> Result<Option<ComicId>, RouteError> {
    if target == "/comic" {
        return Ok(None);
    }
    let digits = target
        .strip_prefix("/comic/")
        .ok_or_else(|| RouteError::MalformedTarget(target.to_string()))?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(RouteError::MalformedTarget(target.to_string()));
    }
    digits
        .parse()
        .map(Some)
        .map_err(|_| RouteError::MalformedTarget(target.to_string()))
}

fn require_id(target: &str) -> Result<ComicId, RouteError> {
    parse_target(target)?.ok_or_else(|| RouteError::MalformedTarget(target.to_string()))
}

async fn read_comic(
    store: &SharedStore,
    request: &Request,
    id: ComicId,
) -> Result<Response, RouteError> {
    info!(id, "read comic");
    let comic = store
        .lock()
        .await
        .read(id)
        .cloned()
        .ok_or(RouteError::NotFound(id))?;
    Ok(ok_json(request, encode(&comic)?))
}

async fn create_comic(store: &SharedStore, request: &Request) -> Result<Response, RouteError> {
    info!(body = %request.body, "create comic");
    let comic: Comic = serde_json::from_str(&request.body)?;
    let created = store.lock().await.create(comic).clone();
    Ok(ok_json(request, encode(&created)?))
}

async fn update_comic(
    store: &SharedStore,
    request: &Request,
    id: ComicId,
) -> Result<Response, RouteError> {
    info!(id, body = %request.body, "update comic");
    let comic: Comic = serde_json::from_str(&request.body)?;
    let updated = store
        .lock()
        .await
        .update(id, comic)
        .cloned()
        .ok_or(RouteError::NotFound(id))?;
    Ok(ok_json(request, encode(&updated)?))
}

async fn delete_comic(
    store: &SharedStore,
    request: &Request,
    id: ComicId,
) -> Result<Response, RouteError> {
    info!(id, "delete comic");
    store.lock().await.delete(id);
    Ok(ok_text(request, format!("Comic {id} deleted.")))
}

fn encode(comic: &Comic) -> Result<String, RouteError> {
    serde_json::to_string(comic).map_err(|err| RouteError::Internal(err.to_string()))
}

fn ok_json(request: &Request, body: String) -> Response {
    Response::new(Status::Ok, request)
        .with_content_type("application/json")
        .with_body(body)
}

fn ok_text(request: &Request, body: String) -> Response {
    Response::new(Status::Ok, request)
        .with_content_type("text/plain")
        .with_body(body)
}

fn bad_request(request: &Request, why: &str) -> Response {
    Response::new(Status::BadRequest, request)
        .with_content_type("text/html")
        .with_body(why)
}

fn not_found(request: &Request) -> Response {
    Response::new(Status::NotFound, request)
        .with_content_type("text/html")
        .with_body(format!(
            "The resource '{}' was not found.",
            request.target
        ))
}

fn server_error(request: &Request) -> Response {
    Response::new(Status::InternalServerError, request)
        .with_content_type("text/html")
        .with_body("An error occurred: 'Internal error'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comic::{shared, Comic, ComicStore};

    fn seeded_store() -> SharedStore {
        let mut store = ComicStore::new();
        store.create(sample("Saga #1"));
        shared(store)
    }

    fn sample(title: &str) -> Comic {
        Comic {
            id: 0,
            title: title.to_string(),
            writer: "Brian K. Vaughan".to_string(),
            artist: "Fiona Staples".to_string(),
            letterer: "Fonografiks".to_string(),
        }
    }

    fn request(method: &str, target: &str, body: &str) -> Request {
        Request::new(method, target, body)
    }

    fn encoded(title: &str) -> String {
        serde_json::to_string(&sample(title)).expect("encode sample")
    }

    #[tokio::test]
    async fn get_returns_existing_record() {
        let store = seeded_store();
        let response = respond(&store, &request("GET", "/comic/0", "")).await;
        assert_eq!(response.code, 200);
        assert_eq!(response.content_type, "application/json");
        let comic: Comic = serde_json::from_str(&response.body).expect("decode body");
        assert_eq!(comic.title, "Saga #1");
    }

    #[tokio::test]
    async fn get_missing_record_is_not_found() {
        let store = seeded_store();
        let response = respond(&store, &request("GET", "/comic/7", "")).await;
        assert_eq!(response.code, 404);
        assert!(response.body.contains("/comic/7"));
    }

    #[tokio::test]
    async fn put_without_id_creates_with_assigned_id() {
        let store = seeded_store();
        let response = respond(&store, &request("PUT", "/comic", &encoded("Saga #2"))).await;
        assert_eq!(response.code, 200);
        let created: Comic = serde_json::from_str(&response.body).expect("decode body");
        assert_eq!(created.id, 1);
        assert_eq!(store.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn post_creates_like_put_without_id() {
        let store = seeded_store();
        let response = respond(&store, &request("POST", "/comic", &encoded("Saga #2"))).await;
        assert_eq!(response.code, 200);
        let created: Comic = serde_json::from_str(&response.body).expect("decode body");
        assert_eq!(created.id, 1);
    }

    #[tokio::test]
    async fn post_with_id_segment_is_malformed() {
        let store = seeded_store();
        let response = respond(&store, &request("POST", "/comic/0", &encoded("Saga #2"))).await;
        assert_eq!(response.code, 400);
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found_and_leaves_store_unchanged() {
        let store = seeded_store();
        let response = respond(&store, &request("PUT", "/comic/9", &encoded("Saga #9"))).await;
        assert_eq!(response.code, 404);
        let guard = store.lock().await;
        assert_eq!(guard.len(), 1);
        assert!(guard.read(9).is_none());
    }

    #[tokio::test]
    async fn update_existing_id_returns_canonical_record() {
        let store = seeded_store();
        let response = respond(&store, &request("PUT", "/comic/0", &encoded("Saga #1, reprint"))).await;
        assert_eq!(response.code, 200);
        let updated: Comic = serde_json::from_str(&response.body).expect("decode body");
        assert_eq!(updated.id, 0);
        assert_eq!(updated.title, "Saga #1, reprint");
    }

    #[tokio::test]
    async fn delete_is_idempotent_over_the_wire() {
        let store = seeded_store();
        for _ in 0..2 {
            let response = respond(&store, &request("DELETE", "/comic/0", "")).await;
            assert_eq!(response.code, 200);
            assert_eq!(response.body, "Comic 0 deleted.");
        }
        assert!(store.lock().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_targets_are_bad_requests() {
        let store = seeded_store();
        for target in ["/comic/abc", "/comic/", "/comic/+1", "/comics/1", "/comic/1/2"] {
            let response = respond(&store, &request("GET", target, "")).await;
            assert_eq!(response.code, 400, "target {target}");
        }
    }

    #[tokio::test]
    async fn unsupported_method_is_a_bad_request() {
        let store = seeded_store();
        let response = respond(&store, &request("PATCH", "/comic/0", "")).await;
        assert_eq!(response.code, 400);
        assert!(response.body.contains("PATCH"));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_bad_request() {
        let store = seeded_store();
        let response = respond(&store, &request("PUT", "/comic", "not json")).await;
        assert_eq!(response.code, 400);
        assert_eq!(store.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn response_mirrors_keep_alive_preference() {
        let store = seeded_store();
        let mut closing = request("GET", "/comic/0", "");
        closing.keep_alive = false;
        let response = respond(&store, &closing).await;
        assert!(response.must_close());

        let open = request("GET", "/comic/0", "");
        let response = respond(&store, &open).await;
        assert!(!response.must_close());
    }
}
