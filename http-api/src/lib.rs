//! Operator HTTP API (§4.10, §6.3): translates the five routes into the kernel's command
//! API and maps its boolean/Result outcomes onto the HTTP status codes the table calls for.
//! CORS is open on every route: the dashboard is untrusted-origin, but the surface itself
//! is explicitly unauthenticated per the Non-goals, so there is nothing CORS would protect.

use kernel_core::KernelHandle;
use kernel_messages::{MessageResponse, Mode, SetWindowRequest, WindowOrigin};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Build the full set of operator routes, with CORS applied.
pub fn routes(handle: KernelHandle) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors().allow_any_origin().allow_methods(["GET", "POST"]).allow_headers(["content-type"]);

    let with_handle = warp::any().map(move || handle.clone());

    let status = warp::path!("api" / "status")
        .and(warp::get())
        .and(with_handle.clone())
        .and_then(get_status);

    let mode_manual = warp::path!("api" / "mode" / "manual")
        .and(warp::post())
        .and(with_handle.clone())
        .and_then(|handle: KernelHandle| set_mode(handle, Mode::Manual));

    let mode_automatic = warp::path!("api" / "mode" / "automatic")
        .and(warp::post())
        .and(with_handle.clone())
        .and_then(|handle: KernelHandle| set_mode(handle, Mode::Automatic));

    let window_set = warp::path!("api" / "window" / "set")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_handle.clone())
        .and_then(set_window);

    let alarm_reset = warp::path!("api" / "alarm" / "reset")
        .and(warp::post())
        .and(with_handle)
        .and_then(reset_alarm);

    status
        .or(mode_manual)
        .or(mode_automatic)
        .or(window_set)
        .or(alarm_reset)
        .with(cors)
}

async fn get_status(handle: KernelHandle) -> Result<impl Reply, Rejection> {
    match handle.snapshot().await {
        Ok(snapshot) => Ok(warp::reply::with_status(warp::reply::json(&snapshot), StatusCode::OK)),
        Err(err) => {
            tracing::error!(%err, "failed to read kernel snapshot");
            Ok(warp::reply::with_status(
                warp::reply::json(&MessageResponse::new("internal error")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn set_mode(handle: KernelHandle, mode: Mode) -> Result<impl Reply, Rejection> {
    let label = mode.as_str();
    let ok = handle.set_mode(mode).await.unwrap_or(false);

    let (message, status) = if ok {
        (format!("Mode set to {label}"), StatusCode::OK)
    } else {
        ("Failed to set mode: system is in ALARM".to_string(), StatusCode::OK)
    };

    Ok(warp::reply::with_status(warp::reply::json(&MessageResponse::new(message)), status))
}

async fn set_window(body: SetWindowRequest, handle: KernelHandle) -> Result<impl Reply, Rejection> {
    if !(0.0..=100.0).contains(&body.percentage) {
        return Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new("percentage must be between 0 and 100")),
            StatusCode::BAD_REQUEST,
        ));
    }

    let snapshot = match handle.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::error!(%err, "failed to read kernel snapshot");
            return Ok(warp::reply::with_status(
                warp::reply::json(&MessageResponse::new("internal error")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    };

    if snapshot.system_mode != Mode::Manual {
        return Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new("Cannot set window opening: system not in MANUAL mode")),
            StatusCode::FORBIDDEN,
        ));
    }

    let ok = handle.set_manual_window(body.percentage, WindowOrigin::Operator).await.unwrap_or(false);
    if ok {
        Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new(format!("Window opening set to {}%", body.percentage))),
            StatusCode::OK,
        ))
    } else {
        Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new("Failed to set window opening")),
            StatusCode::BAD_REQUEST,
        ))
    }
}

async fn reset_alarm(handle: KernelHandle) -> Result<impl Reply, Rejection> {
    let ok = handle.reset_alarm().await.unwrap_or(false);
    if ok {
        Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new("Alarm reset successful")),
            StatusCode::OK,
        ))
    } else {
        Ok(warp::reply::with_status(
            warp::reply::json(&MessageResponse::new("Failed to reset alarm (or system not in alarm state)")),
            StatusCode::BAD_REQUEST,
        ))
    }
}
