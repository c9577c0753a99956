//! Response synthesis: reconcile a handler's declared response with whatever it
//! already wrote into the transport context.

use crate::domain::{EffrouteError, LogicalResponse, Result};
use crate::ports::TransportContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    /// The handler had already written a response; nothing was touched.
    Skipped,
    Written,
}

/// Write `candidate` into `ctx` unless the handler already owns the response.
///
/// 1. a body or non-default status on `ctx` -> skip.
/// 2. otherwise `candidate.body` must be set, else `MissingResponseBody`.
/// 3. status (default 200), headers if given, cookies in emission order, body.
pub fn synthesize<T>(ctx: &mut T, candidate: Option<LogicalResponse>) -> Result<Synthesis>
where
    T: TransportContext + ?Sized,
{
    if ctx.has_response() {
        return Ok(Synthesis::Skipped);
    }

    let Some(response) = candidate else {
        return Err(EffrouteError::MissingResponseBody);
    };
    let status = response.status_or_default();
    let LogicalResponse {
        body,
        headers,
        cookies,
        ..
    } = response;
    let body = body.ok_or(EffrouteError::MissingResponseBody)?;

    ctx.set_status(status);
    if let Some(headers) = headers {
        for (name, value) in &headers {
            ctx.set_header(name, value);
        }
    }
    for cookie in cookies {
        ctx.set_cookie(cookie);
    }
    ctx.set_body(body);

    Ok(Synthesis::Written)
}
