// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The `/RPC2` HTTP endpoint over TCP and Unix sockets.

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, error, info};
use std::fs::Permissions;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::watch;

use super::surface::ControlSurface;
use crate::settings::Credentials;

pub const RPC_PATH: &str = "/RPC2";

type Body = BoxBody<Bytes, std::io::Error>;

static NOTFOUND: &[u8] = b"Not found";
static NOTALLOWED: &[u8] = b"Method not allowed";
static BADREQUEST: &[u8] = b"Bad request";
static UNAUTHORIZED: &[u8] = b"Unauthorized";

/// Bind `path`, replacing a stale socket, and set its mode.
pub fn bind_unix(path: &Path, mode: u32) -> Result<UnixListener> {
    std::fs::remove_file(path)
        .or_else(|error| {
            if error.kind() == ErrorKind::NotFound {
                Ok(())
            } else {
                Err(error)
            }
        })
        .context("failed to remove existing socket")?;

    let sock = UnixListener::bind(path)
        .with_context(|| format!("could not create {}", path.display()))?;
    std::fs::set_permissions(path, Permissions::from_mode(mode))
        .context("could not set socket permissions")?;
    Ok(sock)
}

fn respond(status: StatusCode, content: &'static [u8]) -> Result<Response<Body>> {
    Response::builder()
        .status(status)
        .body(Full::new(content.into()).map_err(|e| match e {}).boxed())
        .map_err(|e| anyhow!("Failed to build {status} response: {}", e))
}

fn unauthorized() -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(WWW_AUTHENTICATE, "Basic realm=\"default\"")
        .body(Full::new(UNAUTHORIZED.into()).map_err(|e| match e {}).boxed())
        .map_err(|e| anyhow!("Failed to build unauthorized response: {}", e))
}

fn internal_error() -> Response<Body> {
    let mut response = Response::new(
        Full::new(Bytes::from(&b"Internal Server Error"[..]))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn authorized<B>(req: &Request<B>, auth: Option<&Credentials>) -> bool {
    let Some(auth) = auth else {
        return true;
    };
    let Some(encoded) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    STANDARD
        .decode(encoded.trim())
        .is_ok_and(|decoded| decoded == format!("{}:{}", auth.username, auth.password).as_bytes())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    surface: &ControlSurface,
    auth: Option<&Credentials>,
) -> Result<Response<Body>> {
    if req.uri().path() != RPC_PATH {
        info!(
            "{} Request to unknown endpoint: {}",
            req.method(),
            req.uri().path()
        );
        return respond(StatusCode::NOT_FOUND, NOTFOUND);
    }
    if !authorized(&req, auth) {
        return unauthorized();
    }
    if req.method() != Method::POST {
        return respond(StatusCode::METHOD_NOT_ALLOWED, NOTALLOWED);
    }
    if req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_none_or(|v| !v.contains("xml"))
    {
        return respond(StatusCode::BAD_REQUEST, BADREQUEST);
    }

    let body = match req.collect().await {
        Ok(body) => body.to_bytes(),
        Err(e) => {
            error!("Failed to read request body: {e}");
            return respond(StatusCode::BAD_REQUEST, BADREQUEST);
        }
    };
    let Ok(body) = std::str::from_utf8(&body) else {
        return respond(StatusCode::BAD_REQUEST, BADREQUEST);
    };

    let reply = surface.handle(body).await;
    Response::builder()
        .header(CONTENT_TYPE, "text/xml")
        .body(Full::new(Bytes::from(reply)).map_err(|e| match e {}).boxed())
        .map_err(|e| anyhow!("Failed to build response: {}", e))
}

fn spawn_connection<S>(stream: S, surface: Arc<ControlSurface>, auth: Option<Arc<Credentials>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    tokio::task::spawn(async move {
        if let Err(err) = http1::Builder::new()
            .serve_connection(
                io,
                service_fn(move |req| {
                    let surface = Arc::clone(&surface);
                    let auth = auth.clone();
                    async move {
                        Ok::<_, anyhow::Error>(
                            handle_request(req, &surface, auth.as_deref())
                                .await
                                .unwrap_or_else(|e| {
                                    error!("Request handling failed: {e}");
                                    internal_error()
                                }),
                        )
                    }
                }),
            )
            .await
        {
            debug!("Error serving connection: {err}");
        }
    });
}

/// Serve until `shutdown` becomes true.
pub async fn serve_unix(
    listener: UnixListener,
    surface: Arc<ControlSurface>,
    auth: Option<Credentials>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let auth = auth.map(Arc::new);
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, _) = accept_result.context("accept failed")?;
                spawn_connection(stream, Arc::clone(&surface), auth.clone());
            }
            _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
        }
    }
}

/// Serve until `shutdown` becomes true.
pub async fn serve_tcp(
    listener: TcpListener,
    surface: Arc<ControlSurface>,
    auth: Option<Credentials>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let auth = auth.map(Arc::new);
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, peer) = accept_result.context("accept failed")?;
                debug!("RPC connection from {peer}");
                spawn_connection(stream, Arc::clone(&surface), auth.clone());
            }
            _ = shutdown.wait_for(|stop| *stop) => return Ok(()),
        }
    }
}
