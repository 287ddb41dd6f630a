//! Property-based tests for core domain types and state derivation.
//!
//! These tests use proptest to verify invariants hold across
//! randomly generated inputs.

use proptest::prelude::*;

use stagehand::core::config::{AutoStash, OperationDefaults};
use stagehand::core::types::{BranchName, Oid, PullStrategy};
use stagehand::engine::state::{derive_state, StateInputs};
use stagehand::engine::StateFlag;
use stagehand::git::GitState;

/// Strategy for generating valid branch name characters.
fn branch_name_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
        Just('/'),
        Just('@'),
    ]
}

/// Strategy for generating valid branch names.
fn valid_branch_name() -> impl Strategy<Value = String> {
    prop::collection::vec(branch_name_char(), 1..50).prop_filter_map(
        "must be valid branch name",
        |chars| {
            let name: String = chars.into_iter().collect();
            let rejected = name == "@"
                || name.starts_with('-')
                || name.ends_with('/')
                || name.contains("..")
                || name.contains("//")
                || name.contains("@{")
                || name
                    .split('/')
                    .any(|c| c.starts_with('.') || c.ends_with(".lock"));
            (!rejected).then_some(name)
        },
    )
}

/// Strategy for generating valid hex OIDs.
fn valid_oid_string() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::sample::select(vec![
            '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
        ]),
        40,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

fn git_state() -> impl Strategy<Value = Option<GitState>> {
    prop_oneof![
        Just(None),
        Just(Some(GitState::Clean)),
        Just(Some(GitState::Merge)),
        Just(Some(GitState::Rebase {
            current: None,
            total: None
        })),
        Just(Some(GitState::CherryPick)),
    ]
}

prop_compose! {
    fn state_inputs()(
        git_state in git_state(),
        detached in any::<bool>(),
        staged in 0usize..4,
        unstaged in 0usize..4,
        conflicted in 0usize..3,
        stash_count in 0usize..3,
    ) -> StateInputs {
        StateInputs { git_state, detached, staged, unstaged, conflicted, stash_count }
    }
}

proptest! {
    #[test]
    fn valid_branch_names_are_accepted(name in valid_branch_name()) {
        let branch = BranchName::new(&name).unwrap();
        prop_assert_eq!(branch.as_str(), name.as_str());
        prop_assert_eq!(branch.to_string(), name);
    }

    #[test]
    fn branch_names_with_forbidden_characters_are_rejected(
        prefix in "[a-z]{1,8}",
        bad in prop::sample::select(vec![' ', '~', '^', ':', '\\', '?', '*', '[', '\t']),
        suffix in "[a-z]{0,8}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(BranchName::new(name).is_err());
    }

    #[test]
    fn lock_suffix_is_rejected_in_any_component(
        head in "[a-z]{1,8}",
        tail in "[a-z]{1,8}",
    ) {
        for name in [
            format!("{head}.lock"),
            format!("{head}.lock/{tail}"),
            format!("{head}/{tail}.lock"),
        ] {
            prop_assert!(BranchName::new(&name).is_err(), "accepted {}", name);
        }
    }

    #[test]
    fn branch_name_serde_roundtrip(name in valid_branch_name()) {
        let branch = BranchName::new(&name).unwrap();
        let json = serde_json::to_string(&branch).unwrap();
        let parsed: BranchName = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(branch, parsed);
    }

    #[test]
    fn oid_normalizes_case(hex in valid_oid_string()) {
        let upper = Oid::new(hex.to_ascii_uppercase()).unwrap();
        let lower = Oid::new(&hex).unwrap();
        prop_assert_eq!(&upper, &lower);
        prop_assert_eq!(lower.as_str(), hex.as_str());
    }

    #[test]
    fn oid_short_is_a_prefix(hex in valid_oid_string(), len in 0usize..60) {
        let oid = Oid::new(&hex).unwrap();
        let short = oid.short(len);
        prop_assert!(hex.starts_with(short));
        prop_assert_eq!(short.len(), len.min(40));
    }

    #[test]
    fn oid_of_wrong_length_is_rejected(hex in "[0-9a-f]{0,80}") {
        prop_assume!(hex.len() != 40);
        prop_assert!(Oid::new(hex).is_err());
    }

    #[test]
    fn clean_excludes_every_other_working_copy_condition(inputs in state_inputs()) {
        let state = derive_state(&inputs);
        let busy = state.contains(StateFlag::HasUncommittedChanges)
            || state.contains(StateFlag::Conflicted)
            || state.contains(StateFlag::Merging)
            || state.contains(StateFlag::Rebasing);
        prop_assert_eq!(state.is_clean(), !busy);
    }

    #[test]
    fn flags_track_their_inputs(inputs in state_inputs()) {
        let state = derive_state(&inputs);
        prop_assert_eq!(state.is_detached(), inputs.detached);
        prop_assert_eq!(state.contains(StateFlag::StashPresent), inputs.stash_count > 0);
        prop_assert_eq!(state.is_conflicted(), inputs.conflicted > 0);
        prop_assert_eq!(
            state.has_uncommitted_changes(),
            inputs.staged + inputs.unstaged > 0
        );
        prop_assert_eq!(state.is_merging(), matches!(inputs.git_state, Some(GitState::Merge)));
        prop_assert_eq!(
            state.is_rebasing(),
            matches!(inputs.git_state, Some(GitState::Rebase { .. }))
        );
    }

    #[test]
    fn detached_and_stash_never_affect_clean(inputs in state_inputs()) {
        let toggled = StateInputs {
            detached: !inputs.detached,
            stash_count: if inputs.stash_count == 0 { 1 } else { 0 },
            ..inputs.clone()
        };
        prop_assert_eq!(derive_state(&inputs).is_clean(), derive_state(&toggled).is_clean());
    }

    #[test]
    fn operation_defaults_set_then_get(
        remote in "[a-z][a-z0-9_-]{0,15}",
        rebase in any::<bool>(),
        untracked in any::<bool>(),
        auto in prop::sample::select(vec![AutoStash::Ask, AutoStash::Always, AutoStash::Never]),
    ) {
        let strategy = if rebase { PullStrategy::Rebase } else { PullStrategy::Merge };
        let mut defaults = OperationDefaults::default();
        defaults.set("remote", &remote).unwrap();
        defaults.set("pull_strategy", &strategy.to_string()).unwrap();
        defaults.set("stash_include_untracked", &untracked.to_string()).unwrap();
        defaults.set("auto_stash_on_switch", &auto.to_string()).unwrap();

        prop_assert_eq!(defaults.get("remote"), Some(remote));
        prop_assert_eq!(defaults.pull_strategy, Some(strategy));
        prop_assert_eq!(defaults.stash_include_untracked, Some(untracked));
        prop_assert_eq!(defaults.auto_stash_on_switch, Some(auto));

        let text = toml::to_string(&defaults).unwrap();
        let parsed: OperationDefaults = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed, defaults);
    }
}
