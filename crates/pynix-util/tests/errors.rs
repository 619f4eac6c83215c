use pynix_util::errors::{PynixError, UnsatisfiedRequirement};

#[test]
fn test_io_error_display() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err = PynixError::from(io_err);
    assert!(err.to_string().contains("I/O error"), "got: {err}");
}

#[test]
fn test_parse_error_display() {
    let err = PynixError::Parse {
        input: "requests >>1".to_string(),
        reason: "unknown operator".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Could not parse requirement `requests >>1`: unknown operator"
    );
}

#[test]
fn test_no_candidates_lists_providers() {
    let err = PynixError::NoCandidatesAvailable {
        name: "torch".to_string(),
        tried: vec!["sdist".to_string()],
        alternatives: vec!["wheel".to_string(), "nixpkgs".to_string()],
    };
    let msg = err.to_string();
    assert!(msg.contains("[sdist]"), "got: {msg}");
    assert!(msg.contains("[wheel, nixpkgs]"), "got: {msg}");
}

#[test]
fn test_no_candidates_without_alternatives() {
    let err = PynixError::NoCandidatesAvailable {
        name: "nope".to_string(),
        tried: vec!["wheel".to_string()],
        alternatives: vec![],
    };
    assert!(err.to_string().ends_with("[none]"));
}

#[test]
fn test_resolution_impossible_names_parents() {
    let err = PynixError::ResolutionImpossible {
        causes: vec![
            UnsatisfiedRequirement {
                requirement: "x==1.0".to_string(),
                parent: Some("a 1.0".to_string()),
            },
            UnsatisfiedRequirement {
                requirement: "b".to_string(),
                parent: None,
            },
        ],
        providers: None,
    };
    let msg = err.to_string();
    assert!(msg.contains("x==1.0 (required by a 1.0)"), "got: {msg}");
    assert!(msg.contains("b (root requirement)"), "got: {msg}");
}

#[test]
fn test_circular_build_dependency_display() {
    let err = PynixError::CircularBuildDependency {
        from: "setuptools".to_string(),
        to: "wheel".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Circular build-time dependency: setuptools -> wheel"
    );
}

#[test]
fn test_generic_error_display() {
    let err = PynixError::Generic {
        message: "something went wrong".to_string(),
    };
    assert_eq!(err.to_string(), "something went wrong");
}

#[test]
fn test_error_is_diagnostic() {
    let err = PynixError::Config {
        message: "bad".to_string(),
    };
    let diag: &dyn miette::Diagnostic = &err;
    assert!(diag.help().is_some());
}
