//! The JSON service surface.
//!
//! Four endpoints at the same granularity as the engine: the public
//! identity key, start, stop and clear. Vote ciphertexts travel hex
//! encoded. Error responses carry a single generic message per category;
//! the detailed cause is only logged server side.

use std::sync::Arc;

use ballotseal::{CancelToken, Decrypter, Error, ErrorKind, FileStore, HybridCrypto};
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::tokio::task::spawn_blocking;
use rocket::{get, post, routes, Request, State};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub type Engine = Decrypter<HybridCrypto, FileStore>;

/// Run the HTTP server until shutdown.
pub async fn serve(port: u16, engine: Engine) -> anyhow::Result<()> {
    let figment = rocket::Config::figment()
        .merge(("port", port))
        .merge(("address", "0.0.0.0"));

    rocket::custom(figment)
        .manage(Arc::new(engine))
        .mount("/", routes![public_key, start, stop, clear])
        .launch()
        .await?;
    Ok(())
}

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        warn!("request failed: {}", self.0);

        let (status, message) = match self.0.kind() {
            ErrorKind::Invalid => (Status::BadRequest, "invalid request"),
            ErrorKind::NotExist => (Status::NotFound, "unknown poll"),
            ErrorKind::Exist => (Status::Conflict, "poll already exists"),
            ErrorKind::Unknown => (Status::InternalServerError, "internal error"),
        };
        (status, message).respond_to(req)
    }
}

#[derive(Serialize)]
struct PublicKeyResponse {
    public_key: String,
}

#[get("/api/public-key")]
fn public_key(engine: &State<Arc<Engine>>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        public_key: hex::encode(engine.public_identity_key()),
    })
}

#[derive(Deserialize)]
struct StartRequest {
    id: String,
}

#[derive(Serialize)]
struct StartResponse {
    pub_key: String,
    pub_key_sig: String,
}

#[post("/api/start", data = "<req>")]
async fn start(
    engine: &State<Arc<Engine>>,
    req: Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let StartRequest { id } = req.into_inner();
    info!("start request for poll {}", id);

    let engine = Arc::clone(engine.inner());
    let (pub_key, pub_key_sig) =
        spawn_blocking(move || engine.start(&id, &CancelToken::new()))
            .await
            .map_err(|err| ApiError(Error::other(format!("start task failed: {}", err))))??;

    Ok(Json(StartResponse {
        pub_key: hex::encode(pub_key),
        pub_key_sig: hex::encode(pub_key_sig),
    }))
}

#[derive(Deserialize)]
struct StopRequest {
    id: String,
    /// Hex encoded vote ciphertexts.
    votes: Vec<String>,
}

#[derive(Serialize)]
struct StopResponse {
    /// The signed serialization of the decrypted votes.
    content: String,
    signature: String,
}

#[post("/api/stop", data = "<req>")]
async fn stop(
    engine: &State<Arc<Engine>>,
    req: Json<StopRequest>,
) -> Result<Json<StopResponse>, ApiError> {
    let StopRequest { id, votes } = req.into_inner();
    info!("stop request for poll {} with {} votes", id, votes.len());

    let mut decoded = Vec::with_capacity(votes.len());
    for vote in &votes {
        let vote = hex::decode(vote)
            .map_err(|_| ApiError(Error::invalid("votes must be hex encoded")))?;
        decoded.push(vote);
    }

    let engine = Arc::clone(engine.inner());
    let (content, signature) =
        spawn_blocking(move || engine.stop(&id, decoded, &CancelToken::new()))
            .await
            .map_err(|err| ApiError(Error::other(format!("stop task failed: {}", err))))??;

    let content = String::from_utf8(content)
        .map_err(|_| ApiError(Error::other("decrypted content is not utf-8")))?;

    Ok(Json(StopResponse {
        content,
        signature: hex::encode(signature),
    }))
}

#[derive(Deserialize)]
struct ClearRequest {
    id: String,
}

#[post("/api/clear", data = "<req>")]
async fn clear(engine: &State<Arc<Engine>>, req: Json<ClearRequest>) -> Result<Status, ApiError> {
    let ClearRequest { id } = req.into_inner();
    info!("clear request for poll {}", id);

    let engine = Arc::clone(engine.inner());
    spawn_blocking(move || engine.clear(&id, &CancelToken::new()))
        .await
        .map_err(|err| ApiError(Error::other(format!("clear task failed: {}", err))))??;

    Ok(Status::NoContent)
}
