//! Self-signed TLS credentials for daemons started in tests.

use esm_config::EsmConfig;

/// Names the generated certificate is valid for.
pub const TEST_SUBJECT_NAMES: [&str; 2] = ["localhost", "127.0.0.1"];

/// Generate a self-signed certificate and key and write them where
/// `settings` expects the daemon credentials. Returns the certificate PEM.
pub fn install_test_credentials(settings: &EsmConfig) -> String {
    let names: Vec<String> = TEST_SUBJECT_NAMES.iter().map(|s| s.to_string()).collect();
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(names).expect("failed to generate test certificate");

    let certificate_pem = cert.pem();
    for (path, contents) in [
        (settings.certificate_path(), certificate_pem.clone()),
        (settings.private_key_path(), key_pair.serialize_pem()),
    ] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create credentials dir");
        }
        std::fs::write(&path, contents).expect("failed to write test credentials");
    }
    certificate_pem
}
