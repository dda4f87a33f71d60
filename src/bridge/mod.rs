//! Bridge to the meico Java library.
//!
//! meico runs inside a JVM child process that executes a small embedded host program
//! (`MeicoHost.java`, launched in single-file source mode with `meico.jar` on the class path).
//! [`runtime::BridgeRuntime`] owns that process and implements
//! [`ConversionService`](crate::service::ConversionService) on top of the line protocol in
//! [`protocol`].

/// Request/reply line codec.
pub mod protocol;
/// Child process lifecycle and the `ConversionService` implementation.
pub mod runtime;
