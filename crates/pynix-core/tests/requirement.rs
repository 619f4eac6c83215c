use std::collections::BTreeSet;

use pynix_core::requirement::Requirement;

type Expected<'a> = (&'a str, &'a [&'a str], &'a [&'a [&'a str]], Option<&'a str>, bool);

fn check(line: &str, expected: Expected<'_>) {
    let (name, extras, specs, build, has_marker) = expected;
    let req = Requirement::parse(line).unwrap_or_else(|e| panic!("{line}: {e}"));
    assert_eq!(req.name, name, "{line}");
    let want_extras: BTreeSet<String> = extras.iter().map(|s| s.to_string()).collect();
    assert_eq!(req.extras, want_extras, "{line}");
    let got_specs: Vec<Vec<String>> = req
        .specs
        .iter()
        .map(|g| g.iter().map(|s| s.to_string()).collect())
        .collect();
    let want_specs: Vec<Vec<String>> = specs
        .iter()
        .map(|g| g.iter().map(|s| s.to_string()).collect())
        .collect();
    assert_eq!(got_specs, want_specs, "{line}");
    assert_eq!(req.build.as_deref(), build, "{line}");
    assert_eq!(req.marker.is_some(), has_marker, "{line}");
}

#[test]
fn test_pep508_lines() {
    check("requests", ("requests", &[], &[], None, false));
    check(
        "requests[socks] ==2.24.0",
        ("requests", &["socks"], &[&["==2.24.0"]], None, false),
    );
    check(
        "python >=2.7,<2.8.0a0",
        ("python", &[], &[&[">=2.7", "<2.8.0a0"]], None, false),
    );
    check(
        "requests == 2.24.0",
        ("requests", &[], &[&["==2.24.0"]], None, false),
    );
    check(
        "pdfminer.six == 20200726",
        ("pdfminer.six", &[], &[&["==20200726"]], None, false),
    );
    check("python>= 3.5", ("python", &[], &[&[">=3.5"]], None, false));
    check(
        "python >=2.6, !=3.0.*",
        ("python", &[], &[&[">=2.6", "!=3.0.*"]], None, false),
    );
    check(
        "unittest2 >=2.0,<3.0 ; python_version == '2.4' or python_version == '2.5'",
        ("unittest2", &[], &[&[">=2.0", "<3.0"]], None, true),
    );
    check(
        "pywin32 > 1.0 ; sys.platform == 'win32'",
        ("pywin32", &[], &[&[">1.0"]], None, true),
    );
}

#[test]
fn test_extras_folded_from_marker() {
    check(
        "certifi (==2016.9.26) ; extra == 'certs'",
        ("certifi", &["certs"], &[&["==2016.9.26"]], None, true),
    );
    check(
        "sphinx ; extra == 'docs'",
        ("sphinx", &["docs"], &[], None, true),
    );
    check(
        "zest.releaser[recommended] ; extra == 'maintainer'",
        ("zest.releaser", &["maintainer", "recommended"], &[], None, true),
    );
}

#[test]
fn test_bare_versions_and_build_tags() {
    check(
        "requests[socks,test] 2.24.0",
        ("requests", &["socks", "test"], &[&["==2.24.0"]], None, false),
    );
    check(
        "hdf5 >=1.10.5,<1.10.6.0a0 mpi_mpich_*",
        ("hdf5", &[], &[&[">=1.10.5", "<1.10.6.0a0"]], Some("mpi_mpich_*"), false),
    );
    check(
        "blas 1.* openblas",
        ("blas", &[], &[&["==1.*"]], Some("openblas"), false),
    );
    check(
        "requests >=2.24.0 build123*",
        ("requests", &[], &[&[">=2.24.0"]], Some("build123*"), false),
    );
    check(
        "requests 2.24.* build123*",
        ("requests", &[], &[&["==2.24.*"]], Some("build123*"), false),
    );
    check(
        "requests 2.24.0 *bla",
        ("requests", &[], &[&["==2.24.0"]], Some("*bla"), false),
    );
    check(
        "requests 2.24.0 *",
        ("requests", &[], &[&["==2.24.0"]], Some("*"), false),
    );
    check(
        "python 3.6.9 ab_73_pypy",
        ("python", &[], &[&["==3.6.9"]], Some("ab_73_pypy"), false),
    );
    check(
        "libcurl 7.71.1 h20c2e04_1",
        ("libcurl", &[], &[&["==7.71.1"]], Some("h20c2e04_1"), false),
    );
    check(
        "ixmp ==0.1.3 1",
        ("ixmp", &[], &[&["==0.1.3"]], Some("1"), false),
    );
}

#[test]
fn test_or_groups() {
    check(
        "ruamel.yaml >=0.12.4,<0.16|0.16.5.*",
        ("ruamel.yaml", &[], &[&[">=0.12.4", "<0.16"], &["==0.16.5.*"]], None, false),
    );
    check(
        "openjdk =8|11",
        ("openjdk", &[], &[&["==8"], &["==11"]], None, false),
    );
    check(
        "gitpython >=3.0.8,3.0.*",
        ("gitpython", &[], &[&[">=3.0.8", "==3.0.*"]], None, false),
    );
}

#[test]
fn test_legacy_accept_anything() {
    check("pytz (>dev)", ("pytz", &[], &[], None, false));
}

#[test]
fn test_colon_marker_clause() {
    check(
        "enum34: python_version < '3.4'",
        ("enum34", &[], &[], None, true),
    );
}
