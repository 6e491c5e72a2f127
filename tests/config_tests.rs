use blockwatch::commands::context::CommandContext;
use blockwatch::config::{Config, validator::ConfigValidator};
use blockwatch::manager::{ManagerState, ServiceOptions};
use blockwatch::rules::{Comparison, MatchMode, MessageMode};
use blockwatch::sink::Outbox;
use blockwatch::source::World;
use blockwatch::{BlockwatchContext, BodyId, CONFIG_PATH_ENV, Level, Unit};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[core]
enabled = true
notification_period_secs = 120
initial_delay_secs = 5

[performance]
parallel_threads = 2

[[groups]]
name = "Heavy Industry"
level = "cluster"
match_mode = "any"
message_mode = "percentage"
percent_owned = 40.0
message = "Too much industry:"
leaf_count = { comparison = "more", threshold = 1 }

[[groups.rules]]
name = "refineries"
matches = "Refinery/Large*"
comparison = "greater"
threshold = 3

[[groups.rules]]
matches = "Assembler"
comparison = "less"
threshold = 1
"#;

#[test]
fn test_full_config_parses() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config");
    std::fs::write(&path, FULL_CONFIG).unwrap();

    let config = Config::load(&path).unwrap();
    assert!(config.core.enabled);
    assert_eq!(config.performance.parallel_threads, 2);

    let group = config.group("Heavy Industry").unwrap();
    assert_eq!(group.level, Level::Cluster);
    assert_eq!(group.match_mode, MatchMode::Any);
    assert_eq!(group.message_mode, MessageMode::Percentage);
    assert_eq!(group.leaf_count.comparison, Comparison::Greater);
    assert_eq!(group.rules.len(), 2);
    assert_eq!(group.rules[1].name, None);
    assert_eq!(group.rules[1].comparison, Comparison::Less);

    let options = ServiceOptions::from(&config);
    assert!(options.enabled);
    assert_eq!(options.notification_period, Some(Duration::from_secs(120)));
    assert_eq!(options.initial_delay, Duration::from_secs(5));

    let warnings = ConfigValidator::new().check_config_file(&path).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn test_missing_file_is_created_with_sample() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/dir/config");

    let config = Config::load(&path).unwrap();
    assert!(path.exists());
    assert!(config.group("Testing Group").is_some());

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.groups, config.groups);
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config");
    std::fs::write(
        &path,
        "[[groups]]\nname = \"Bad\"\npercent_owned = 150.0\n",
    )
    .unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn test_unknown_fields_produce_warnings() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config");
    std::fs::write(
        &path,
        "[core]\ntimer_seconds = 5\ncolour = true\n\n[[groups]]\nname = \"G\"\nlevle = \"body\"\n",
    )
    .unwrap();

    let warnings = ConfigValidator::new().check_config_file(&path).unwrap();
    assert_eq!(warnings.len(), 3, "{warnings:?}");
    assert!(warnings.iter().any(|w| w.contains("timer_seconds")));
    assert!(warnings.iter().any(|w| w.contains("levle")));
}

#[test]
fn test_zero_period_disables_timer() {
    let mut config = Config::default();
    config.set("core.notification_period_secs", "0").unwrap();
    assert!(ServiceOptions::from(&config).notification_period.is_none());
}

#[test]
fn test_disabled_config_leaves_manager_stopped() {
    let temp = TempDir::new().unwrap();
    let ctx = BlockwatchContext::new_explicit(temp.path().join("config")).unwrap();
    assert!(!ctx.config.core.enabled);

    let world = World::new();
    world.add_body(BodyId(1), None, vec![Unit::new("Refinery", "Large", Some(1))]);
    let options = ServiceOptions::from(&ctx.config);
    assert!(!options.enabled);

    let service = ctx
        .start_service(&Arc::new(world), Arc::new(Outbox::new()), options)
        .unwrap();
    assert_eq!(
        service.with_manager(|m| m.state()).unwrap(),
        ManagerState::Stopped
    );
    assert!(service.trigger_notification_now().is_err());

    // Flipping the flag at runtime starts tracking
    service.set_enabled(true).unwrap();
    assert_eq!(
        service.with_manager(|m| m.state()).unwrap(),
        ManagerState::Running
    );
    assert_eq!(service.count_nodes_of_level(Level::Body).unwrap(), 1);
}

#[test]
fn test_disabled_config_skips_world_commands_unless_forced() {
    let temp = TempDir::new().unwrap();
    let ctx = BlockwatchContext::new_explicit(temp.path().join("config")).unwrap();
    let missing = temp.path().join("no-such-world.toml");

    // Disabled: returns before the world is even read
    blockwatch::commands::tree::execute(&ctx, &missing, false, false).unwrap();
    blockwatch::commands::run::execute(&ctx, &missing, None, None, false).unwrap();

    // Forced: the missing world is now an error
    assert!(blockwatch::commands::tree::execute(&ctx, &missing, false, true).is_err());
}

#[test]
#[serial]
fn test_context_honours_config_path_env() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("custom/config");

    unsafe {
        std::env::set_var(CONFIG_PATH_ENV, &path);
    }
    let resolved = BlockwatchContext::default_config_path();
    let ctx = BlockwatchContext::new_explicit(resolved.unwrap());
    unsafe {
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    let ctx = ctx.unwrap();
    assert_eq!(ctx.config_path, path);
    assert!(path.exists());
}

#[test]
#[serial]
fn test_set_and_save_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config");
    let mut ctx = BlockwatchContext::new_explicit(path.clone()).unwrap();

    blockwatch::commands::config::execute(
        &mut ctx,
        Some("core.notification_period_secs"),
        Some("15m"),
        false,
        false,
    )
    .unwrap();
    assert_eq!(Config::load(&path).unwrap().core.notification_period_secs, 900);

    blockwatch::commands::config::execute(
        &mut ctx,
        Some("core.notification_period_secs"),
        None,
        true,
        false,
    )
    .unwrap();
    assert_eq!(Config::load(&path).unwrap().core.notification_period_secs, 600);
    assert!(
        blockwatch::commands::config::execute(&mut ctx, Some("core.bogus"), Some("1"), false, false)
            .is_err()
    );
}
