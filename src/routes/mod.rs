/// Router Module Index
///
/// Routes are grouped by resource. Access control is not applied here: every request passes the
/// pipeline (authenticate, then the `AccessPolicy` table) before it reaches any of these routers.

/// `POST /auth`: token issuance.
pub mod auth;

/// `/topicos`: topic listing, detail and mutations.
pub mod topics;

/// `/actuator`: operational probes.
pub mod actuator;
