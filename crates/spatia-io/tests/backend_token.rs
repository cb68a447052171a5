//! Backend token lifetime. Kept in its own test binary so no other test holds
//! a token while the refcount is checked.

use spatia_core::{AudioEngine, Configuration};
use spatia_io::{AudioBackend, CpalBackend, LiveEngine, LiveSettings, backend_refcount};

#[test]
fn test_close_releases_backend_token() {
    let mut backend = CpalBackend::new().unwrap();
    assert_eq!(backend_refcount(), 1);
    backend.close();
    assert_eq!(backend_refcount(), 0);
    assert!(!backend.is_open());
    drop(backend);

    let engine = AudioEngine::new(Configuration::new(48000, 64, 0, 2));
    let mut live = LiveEngine::new(CpalBackend::new().unwrap(), engine, LiveSettings::default());
    assert_eq!(backend_refcount(), 1);
    live.close().unwrap();
    assert_eq!(backend_refcount(), 0);
    drop(live);
    assert_eq!(backend_refcount(), 0);
}
