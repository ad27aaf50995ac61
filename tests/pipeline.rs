// tests/pipeline.rs

//! End-to-end use, staleness and rebuild tests against the fake backend.

mod common;

use chrono::{Duration, Utc};
use common::{TestEnv, fake_recipe};
use std::fs;
use tendril::{
    BuildCache, Error, PackageState, RecipeInput, RecipeSpec, StaleReason, UseOptions, UseOutcome,
};

fn spec(package: &str) -> RecipeSpec {
    RecipeSpec::from(package)
}

fn position(session: &tendril::Session, package: &str, state: PackageState) -> Option<usize> {
    session
        .trace()
        .iter()
        .position(|e| e.package == package && e.state == state)
}

#[test]
fn test_dependencies_activate_first() {
    let env = TestEnv::new(vec![fake_recipe("p", &["d"]), fake_recipe("d", &[])]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: true });
    assert_eq!(env.compiled(), vec!["d", "p"]);
    assert_eq!(env.activated(), vec!["d", "p"]);

    let config = session.config().clone();
    assert_eq!(
        session.load_path(),
        &[config.package_build_path("d"), config.package_build_path("p")]
    );
    assert_eq!(session.cache().dependencies("p"), Some(&["d".to_string()][..]));

    let d_active = position(&session, "d", PackageState::Activated).unwrap();
    let p_active = position(&session, "p", PackageState::Activated).unwrap();
    let p_checked_out = position(&session, "p", PackageState::CheckedOut).unwrap();
    assert!(p_checked_out < d_active);
    assert!(d_active < p_active);

    assert!(config.build_cache_path().exists());
    assert!(config.package_build_path("p").join("p.el").exists());
}

#[test]
fn test_second_session_finds_builds_fresh() {
    let env = TestEnv::new(vec![fake_recipe("p", &["d"]), fake_recipe("d", &[])]);
    env.session()
        .use_package(&spec("p"), &UseOptions::default())
        .unwrap();
    env.clear_log();

    let mut session = env.session();
    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: false });
    assert!(env.compiled().is_empty());
    assert!(env.log.borrow().clones.is_empty());
    assert_eq!(env.activated(), vec!["d", "p"]);
    assert!(position(&session, "p", PackageState::Fresh).is_some());
    assert!(position(&session, "d", PackageState::Fresh).is_some());
    assert!(position(&session, "p", PackageState::Built).is_none());
}

#[test]
fn test_use_twice_in_one_session() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let mut session = env.session();

    session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    session.take_trace();
    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: false });
    assert_eq!(env.compiled(), vec!["p"]);
    assert!(position(&session, "p", PackageState::Built).is_none());
    assert_eq!(session.load_path().len(), 1);
}

#[test]
fn test_modified_sources_trigger_rebuild() {
    let env = TestEnv::new(vec![fake_recipe("p", &["d"]), fake_recipe("d", &[])]);
    let config = env.config();
    env.session()
        .use_package(&spec("p"), &UseOptions::default())
        .unwrap();

    // Pretend p was built an hour before its sources were last touched
    let built = Utc::now() - Duration::hours(1);
    let mut cache = BuildCache::load(&config.build_cache_path()).unwrap();
    let entry = cache.get("p").unwrap().clone();
    cache.finalize_build_at("p", &entry.recipe, entry.dependencies, built);
    cache.save(&config.build_cache_path()).unwrap();
    fs::write(config.repo_path("p").join("p.el"), common::elisp_source("p", &["d"])).unwrap();
    env.clear_log();

    let mut session = env.session();
    assert_eq!(
        session.check_package("p").unwrap(),
        Some(StaleReason::SourcesModified)
    );
    assert_eq!(session.check_package("d").unwrap(), None);

    session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    assert_eq!(env.compiled(), vec!["p"]);
    assert_eq!(env.activated(), vec!["d", "p"]);

    let rebuilt = session.cache().get("p").unwrap().last_build_time.unwrap();
    assert!(rebuilt > built);
}

#[test]
fn test_check_before_and_after_build() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let mut session = env.session();

    assert_eq!(
        session.check_package("p").unwrap(),
        Some(StaleReason::NeverBuilt)
    );
    session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    assert_eq!(session.check_package("p").unwrap(), None);
    assert!(session.check_all().unwrap().is_empty());
}

#[test]
fn test_dependency_cycle_terminates() {
    let env = TestEnv::new(vec![fake_recipe("a", &["b"]), fake_recipe("b", &["a"])]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("a"), &UseOptions::default()).unwrap();

    assert!(outcome.is_activated());
    assert_eq!(env.compiled(), vec!["b", "a"]);
    assert_eq!(env.activated(), vec!["b", "a"]);
}

#[test]
fn test_failed_dependency_leaves_build_incomplete() {
    let env = TestEnv::new(vec![fake_recipe("p", &["d"]), fake_recipe("d", &[])]);
    env.log.borrow_mut().fail_compile.insert("d".to_string());
    let mut session = env.session();

    let err = session
        .use_package(&spec("p"), &UseOptions::default())
        .unwrap_err();
    match err {
        Error::DependencyFailed {
            package,
            dependency,
            source,
        } => {
            assert_eq!(package, "p");
            assert_eq!(dependency, "d");
            assert!(matches!(*source, Error::BuildFailed { .. }));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(env.activated().is_empty());
    assert!(session.cache().get("p").unwrap().last_build_time.is_none());
    assert!(session.cache().get("d").unwrap().last_build_time.is_none());

    env.log.borrow_mut().fail_compile.clear();
    let mut session = env.session();
    assert_eq!(
        session.check_package("p").unwrap(),
        Some(StaleReason::IncompleteBuild)
    );
    session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    assert_eq!(env.compiled(), vec!["d", "p"]);
}

#[test]
fn test_failed_rebuild_is_retried_next_run() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let mut session = env.session();
    session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    env.log.borrow_mut().fail_compile.insert("p".to_string());
    let err = session.rebuild_package("p").unwrap_err();
    assert!(matches!(err, Error::BuildFailed { .. }));
    assert!(session.cache().get("p").unwrap().last_build_time.is_none());

    env.log.borrow_mut().fail_compile.clear();
    env.clear_log();
    let mut session = env.session();
    assert_eq!(
        session.check_package("p").unwrap(),
        Some(StaleReason::IncompleteBuild)
    );

    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    assert_eq!(outcome, UseOutcome::Activated { built: true });
    assert_eq!(env.compiled(), vec!["p"]);
    assert!(session.cache().get("p").unwrap().last_build_time.is_some());
}

#[test]
fn test_redeclaration_in_one_operation_is_registered() {
    let env = TestEnv::new(vec![]);
    let mut session = env.session();

    let first = RecipeInput::new("a").with_field("repo", "one/a");
    let second = RecipeInput::new("a").with_field("repo", "two/a");
    let report = session
        .use_packages(
            &[RecipeSpec::Literal(first), RecipeSpec::Literal(second)],
            &UseOptions::default(),
        )
        .unwrap();

    assert!(report.is_success());
    assert_eq!(env.compiled(), vec!["a"]);

    let warnings = env.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Package a was redeclared with a different repo"));
    assert_eq!(
        session.registry().recipe("a").unwrap().field_str("repo"),
        Some("two/a")
    );
}

#[test]
fn test_rebuild_package_only_rebuilds_target() {
    let env = TestEnv::new(vec![fake_recipe("p", &["d"]), fake_recipe("d", &[])]);
    let mut session = env.session();
    session.use_package(&spec("p"), &UseOptions::default()).unwrap();
    env.clear_log();

    let outcome = session.rebuild_package("p").unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: true });
    assert_eq!(env.compiled(), vec!["p"]);
    assert_eq!(env.activated(), vec!["d", "p"]);
}

#[test]
fn test_rebuild_all_builds_shared_dependency_once() {
    let env = TestEnv::new(vec![
        fake_recipe("p1", &["d"]),
        fake_recipe("p2", &["d"]),
        fake_recipe("d", &[]),
    ]);
    let mut session = env.session();
    let report = session
        .use_packages(&[spec("p1"), spec("p2")], &UseOptions::default())
        .unwrap();
    assert!(report.is_success());
    assert_eq!(env.compiled(), vec!["d", "p1", "p2"]);
    env.clear_log();

    let report = session.rebuild_all().unwrap();

    assert!(report.is_success());
    let mut compiled = env.compiled();
    compiled.sort();
    assert_eq!(compiled, vec!["d", "p1", "p2"]);
}

#[test]
fn test_lazy_use_does_not_clone() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("p"), &UseOptions::lazy()).unwrap();

    assert_eq!(outcome, UseOutcome::NotCheckedOut);
    assert!(env.log.borrow().clones.is_empty());
    assert!(!session.config().repo_path("p").exists());
}

#[test]
fn test_no_build_activates_without_compiling() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("p"), &UseOptions::no_build()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: false });
    assert_eq!(env.log.borrow().clones, vec!["p"]);
    assert!(env.compiled().is_empty());
    assert_eq!(env.activated(), vec!["p"]);
    assert!(position(&session, "p", PackageState::Skipped).is_some());
}

#[test]
fn test_no_build_recipe_is_skipped() {
    let mut recipe = fake_recipe("docs", &[]);
    recipe.no_build = true;
    let env = TestEnv::new(vec![recipe]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("docs"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: false });
    assert!(env.compiled().is_empty());
}

#[test]
fn test_builtin_and_unknown_dependencies_are_skipped() {
    let env = TestEnv::new(vec![fake_recipe("p", &["emacs", "ghost", "d"]), fake_recipe("d", &[])]);
    let mut session = env.session();

    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: true });
    assert_eq!(env.activated(), vec!["d", "p"]);
    assert!(position(&session, "emacs", PackageState::NotInstalled).is_some());
    assert!(position(&session, "ghost", PackageState::NotInstalled).is_some());
    assert!(env.warnings().iter().any(|w| w.contains("ghost")));
}

#[test]
fn test_required_package_must_resolve() {
    let env = TestEnv::new(vec![]);
    let mut session = env.session();

    let err = session
        .use_package(&spec("ghost"), &UseOptions::default().required())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_failed_clone_is_reported() {
    let env = TestEnv::new(vec![fake_recipe("p", &[]).with_field("fail_clone", true)]);
    let mut session = env.session();

    let err = session
        .use_package(&spec("p"), &UseOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::VcError { .. }));
    assert!(env.activated().is_empty());
}

#[test]
fn test_corrupt_cache_is_replaced() {
    let env = TestEnv::new(vec![fake_recipe("p", &[])]);
    let config = env.config();
    fs::create_dir_all(&config.base_dir).unwrap();
    fs::write(config.build_cache_path(), "{ not json").unwrap();

    let mut session = env.session();
    let outcome = session.use_package(&spec("p"), &UseOptions::default()).unwrap();

    assert_eq!(outcome, UseOutcome::Activated { built: true });
    assert_eq!(env.warnings().len(), 1);
    let cache = BuildCache::load(&config.build_cache_path()).unwrap();
    assert!(cache.get("p").is_some());
}

#[test]
fn test_conflicting_recipes_warn_once() {
    let env = TestEnv::new(vec![]);
    let mut session = env.session();

    let first = RecipeInput::new("a")
        .with_local_repo("shared")
        .with_field("repo", "one/shared");
    let second = RecipeInput::new("b")
        .with_local_repo("shared")
        .with_field("repo", "two/shared");

    for input in [first, second.clone(), second] {
        let recipe = session
            .normalize(&RecipeSpec::Literal(input))
            .unwrap()
            .into_recipe()
            .unwrap();
        session.register(recipe).unwrap();
    }

    let warnings = env.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Packages a and b share repository shared"));
    assert_eq!(
        session.registry().recipe_for_repo("shared").unwrap().package,
        "b"
    );
}

#[test]
fn test_shared_repository_adopts_backend_fields() {
    let env = TestEnv::new(vec![RecipeInput::new("b").with_local_repo("shared")]);
    let mut session = env.session();

    let a = RecipeInput::new("a")
        .with_local_repo("shared")
        .with_field("repo", "one/shared")
        .with_field("branch", "dev");
    let a = session
        .normalize(&RecipeSpec::Literal(a))
        .unwrap()
        .into_recipe()
        .unwrap();
    session.register(a).unwrap();

    let b = session.normalize(&spec("b")).unwrap().into_recipe().unwrap();
    assert_eq!(b.field_str("repo"), Some("one/shared"));
    assert_eq!(b.field_str("branch"), Some("dev"));

    session.register(b).unwrap();
    assert!(env.warnings().is_empty());
}
