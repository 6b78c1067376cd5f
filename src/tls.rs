use std::sync::OnceLock;

/// Select rustls' ring provider for the process.
///
/// rustls 0.23 panics on the first config build when it cannot infer a provider, which happens
/// as soon as two dependencies enable different ones. Installing fails harmlessly when another
/// part of the process already chose one.
pub fn install_rustls_crypto_provider() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
