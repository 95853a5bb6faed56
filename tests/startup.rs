//! End-to-end startup tests: command line in, loader started (or not) out.
//!
//! Each test builds its own stage directory with an `etc/` folder holding
//! the configuration files, and never touches the real process identity.

use std::fs;
use std::path::PathBuf;

use proxy_bootstrap::testing::{Call, MockUserOperations};
use proxy_bootstrap::{App, ConfigLoader, Error, Outcome, Stage, UserEntry, MAIN_LOGGER};
use tempfile::TempDir;

struct StageDir {
    dir: TempDir,
}

impl StageDir {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("etc")).unwrap();
        fs::create_dir(dir.path().join("bin")).unwrap();
        let stage = StageDir { dir };
        stage.write("mysqlrouter.conf", "[DEFAULT]\nlogging_folder =\n\n[magic]\nfoo = baz\n");
        stage.write("mysqlrouter_extra.conf", "[magic]\nfoo = bar\n");
        stage.write("config_a.conf", "[routing:a]\nport = 7001\n");
        stage.write("config_b.conf", "[routing:b]\nport = 7002\n");
        stage.write("config_c.ini", "[magic]\n");
        stage.write("parse_error.conf", "[DEFAULT]\n[magic\nfoo = bar\n");
        stage
    }

    fn write(&self, name: &str, text: &str) {
        fs::write(self.etc(name), text).unwrap();
    }

    fn etc(&self, name: &str) -> String {
        self.dir.path().join("etc").join(name).to_string_lossy().into_owned()
    }

    fn origin(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    fn app<'a>(&self, args: &[&str], ops: &'a MockUserOperations) -> Result<App<'a>, Error> {
        App::from_args(self.origin(), args.iter().copied(), ops)
            .map(|app| {
                app.with_default_config_files(vec!["{origin}/../etc/nothing_here.conf".into()])
            })
    }

    fn start(
        &self,
        args: &[&str],
        ops: &MockUserOperations,
    ) -> Result<(Outcome, ConfigLoader), Error> {
        let mut app = self.app(args, ops)?;
        let mut loader = ConfigLoader::default();
        let outcome = app.run(&mut loader, &mut Vec::new())?;
        Ok((outcome, loader))
    }
}

fn started_files(outcome: Outcome) -> Vec<PathBuf> {
    match outcome {
        Outcome::Started(files) => files.into_paths(),
        other => panic!("expected the loader to start, got {other:?}"),
    }
}

#[test]
fn single_config() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let ops = MockUserOperations::with_euid(1000);
    let (outcome, loader) = stage.start(&["--config", conf.as_str()], &ops).unwrap();
    assert_eq!(started_files(outcome), vec![PathBuf::from(&conf)]);
    assert_eq!(loader.config().get("magic", "", "foo"), Some("baz"));
    assert!(ops.calls().is_empty());
}

#[test]
fn config_and_extra_config() {
    let stage = StageDir::new();
    let a = stage.etc("config_a.conf");
    let b = stage.etc("config_b.conf");
    let ops = MockUserOperations::with_euid(1000);
    let (outcome, loader) = stage.start(&["-c", a.as_str(), "-a", b.as_str()], &ops).unwrap();
    assert_eq!(started_files(outcome), vec![PathBuf::from(a), PathBuf::from(b)]);
    assert_eq!(loader.config().get("routing", "a", "port"), Some("7001"));
    assert_eq!(loader.config().get("routing", "b", "port"), Some("7002"));
}

#[test]
fn section_spread_over_files() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let extra = format!("--extra-config={}", stage.etc("mysqlrouter_extra.conf"));
    let ops = MockUserOperations::with_euid(1000);
    let (_, loader) = stage.start(&["--config", conf.as_str(), extra.as_str()], &ops).unwrap();
    assert_eq!(loader.config().get("magic", "", "foo"), Some("bar"));
    assert_eq!(loader.config().get("magic", "", "NotInTheSection"), None);
}

#[test]
fn config_option_twice() {
    let stage = StageDir::new();
    let a = stage.etc("config_a.conf");
    let b = stage.etc("config_b.conf");
    let ops = MockUserOperations::with_euid(1000);
    let err = stage.start(&["--config", a.as_str(), "-c", b.as_str()], &ops).unwrap_err();
    assert!(err.to_string().contains("can only be used once"));
}

#[test]
fn missing_files_are_named() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let gone = stage.etc("foobar.conf");
    let ops = MockUserOperations::with_euid(1000);

    let err = stage.start(&["--config", gone.as_str()], &ops).unwrap_err();
    assert!(err.to_string().contains("Failed reading configuration file"));
    assert!(err.to_string().ends_with(&gone));

    let err = stage
        .start(&["--config", conf.as_str(), "--extra-config", gone.as_str()], &ops)
        .unwrap_err();
    assert!(err.to_string().ends_with(&gone));

    let err = stage.start(&["--config", ""], &ops).unwrap_err();
    assert!(err.to_string().starts_with("Failed reading configuration file"));
}

#[test]
fn duplicate_extra_config() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let a = stage.etc("config_a.conf");
    let ops = MockUserOperations::with_euid(1000);
    let err = stage
        .start(&["-c", conf.as_str(), "-a", a.as_str(), "-a", a.as_str()], &ops)
        .unwrap_err();
    assert!(err.to_string().contains("Duplicate configuration file"));
    assert!(err.to_string().contains(&a));
}

#[test]
fn extra_config_without_any_base() {
    let stage = StageDir::new();
    let extra = stage.etc("mysqlrouter.conf");
    let ops = MockUserOperations::with_euid(1000);
    let err = stage.start(&["--extra-config", extra.as_str()], &ops).unwrap_err();
    assert!(err
        .to_string()
        .contains("Extra configuration files only work when other "));
}

#[test]
fn default_location_falls_back_to_ini() {
    let stage = StageDir::new();
    let ops = MockUserOperations::with_euid(1000);
    let mut app = stage
        .app(&[], &ops)
        .unwrap()
        .with_default_config_files(vec!["{origin}/../etc/config_c.conf".into()]);
    let outcome = app.run(&mut ConfigLoader::default(), &mut Vec::new()).unwrap();
    let files = started_files(outcome);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("config_c.ini"));
}

#[test]
fn explicit_config_does_not_fall_back_to_ini() {
    let stage = StageDir::new();
    let conf = stage.etc("config_c.conf");
    let ops = MockUserOperations::with_euid(1000);
    let err = stage.start(&["-c", conf.as_str()], &ops).unwrap_err();
    assert!(err.to_string().ends_with(&conf));
}

#[test]
fn nothing_to_start_from() {
    let stage = StageDir::new();
    let ops = MockUserOperations::with_euid(1000);
    let err = stage.start(&[], &ops).unwrap_err();
    assert!(err.to_string().contains("No valid configuration file"));
    assert!(err.to_string().contains("nothing_here.conf"));
}

#[test]
fn malformed_file_is_a_configuration_error() {
    let stage = StageDir::new();
    let conf = stage.etc("parse_error.conf");
    let ops = MockUserOperations::with_euid(1000);
    let mut app = stage.app(&["--config", conf.as_str()], &ops).unwrap();
    let err = app.run(&mut ConfigLoader::default(), &mut Vec::new()).unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Configuration error: Malformed section header:"));
    assert_eq!(app.stage(), Stage::Failed);
}

#[test]
fn info_options_never_start() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let cases: Vec<Vec<&str>> = vec![
        vec!["--version"],
        vec!["--help"],
        vec!["--help", "--config", conf.as_str()],
        vec!["--config", conf.as_str(), "--help"],
    ];
    for args in cases {
        let ops = MockUserOperations::with_euid(1000);
        let mut app = stage.app(&args, &ops).unwrap();
        let mut loader = ConfigLoader::default();
        let mut out = Vec::new();
        assert_eq!(app.run(&mut loader, &mut out).unwrap(), Outcome::PrintedInfo);
        assert!(String::from_utf8(out).unwrap().contains("dbproxy v"));
        assert!(loader.registry().logger_names().is_empty());
    }
}

#[test]
fn one_logger_per_plugin_plus_main() {
    let stage = StageDir::new();
    stage.write(
        "logging.conf",
        "[DEFAULT]\nlogging_folder =\n\n[logger]\nlevel = DEBUG\n\n\
         [magic]\ndo_magic = yes\nmessage = It is some kind of magic\n\n\
         [lifecycle3]\n[lifecycle:instance1]\n",
    );
    let conf = stage.etc("logging.conf");
    let ops = MockUserOperations::with_euid(1000);
    let (_, loader) = stage.start(&["-c", conf.as_str()], &ops).unwrap();
    let mut names = loader.registry().logger_names();
    names.sort_unstable();
    assert_eq!(names, vec!["lifecycle", "lifecycle3", "magic", MAIN_LOGGER]);
}

#[test]
fn permanent_switch_before_loading() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let ops = MockUserOperations::root().with_user(UserEntry::new("mysqlrouter", 17, 12));
    let (outcome, _) = stage.start(&["-c", conf.as_str(), "--user", "mysqlrouter"], &ops).unwrap();
    assert!(matches!(outcome, Outcome::Started(_)));
    assert_eq!(
        ops.calls(),
        vec![
            Call::Geteuid,
            Call::Getpwnam("mysqlrouter".into()),
            Call::Initgroups("mysqlrouter".into(), 12),
            Call::Setgid(12),
            Call::Setuid(17),
        ]
    );
}

#[test]
fn unknown_user_stops_startup() {
    let stage = StageDir::new();
    let conf = stage.etc("mysqlrouter.conf");
    let ops = MockUserOperations::root();
    let err = stage.start(&["-c", conf.as_str(), "-u", "124"], &ops).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Can't use user '124'. Please check that the user exists!"
    );
}

#[test]
fn bootstrap_skips_configuration() {
    let stage = StageDir::new();
    let ops = MockUserOperations::with_euid(1000);
    let (outcome, loader) = stage.start(&["--bootstrap", "127.0.0.1:3060"], &ops).unwrap();
    match outcome {
        Outcome::Bootstrap(request) => assert_eq!(request.server, "127.0.0.1:3060"),
        other => panic!("expected bootstrap, got {other:?}"),
    }
    assert!(loader.registry().logger_names().is_empty());
}
