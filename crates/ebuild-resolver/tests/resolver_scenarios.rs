/// Integration tests for resolving against repositories loaded from disk
///
/// Repositories and configuration are written to a temporary directory and
/// loaded the same way a front end would load them.

use std::fs;
use std::path::Path;

use ebuild_atom::Atom;
use ebuild_resolver::{
    FailureReason, MemoryRepository, MergePlan, Operation, Policy, Repository, ResolverConfig,
};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join(name);
    fs::write(&path, content)?;
    Ok(path)
}

fn load(path: &Path) -> anyhow::Result<Box<dyn Repository>> {
    Ok(Box::new(MemoryRepository::from_path(path)?))
}

fn atoms(list: &[&str]) -> anyhow::Result<Vec<Atom>> {
    Ok(list.iter().map(|s| Atom::parse(s)).collect::<Result<_, _>>()?)
}

const GENTOO: &str = r#"{
    "name": "gentoo",
    "packages": [
        { "cpv": "app-editors/vim-9.1", "rdepend": "dev-libs/libsodium sys-libs/ncurses:0=" },
        { "cpv": "dev-libs/libsodium-1.0.19", "slot": "0", "subslot": "26" },
        { "cpv": "dev-libs/libsodium-1.0.18", "slot": "0", "subslot": "23" },
        { "cpv": "sys-libs/ncurses-6.4", "slot": "0", "subslot": "6", "depend": "virtual/pkgconfig" },
        { "cpv": "virtual/pkgconfig-3", "rdepend": "|| ( dev-util/pkgconf dev-util/pkgconfig )" },
        { "cpv": "dev-util/pkgconf-2.1" },
        { "cpv": "dev-lang/python-3.12.1", "slot": "3.12" },
        { "cpv": "dev-lang/python-3.11.7", "slot": "3.11" }
    ]
}"#;

const VDB: &str = r#"{
    "name": "vdb",
    "livefs": true,
    "packages": [
        { "cpv": "dev-libs/libsodium-1.0.18", "slot": "0", "subslot": "23", "built": true },
        { "cpv": "dev-lang/python-3.11.7", "slot": "3.11", "built": true },
        { "cpv": "sys-apps/portage-3.0.60", "built": true, "rdepend": "dev-lang/python" }
    ]
}"#;

#[test]
fn test_resolve_from_json_repositories() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let gentoo = write(dir.path(), "gentoo.json", GENTOO)?;
    let vdb = write(dir.path(), "vdb.json", VDB)?;

    let mut plan = MergePlan::new(
        vec![load(&vdb)?, load(&gentoo)?],
        Policy::highest(),
        ResolverConfig::default(),
    );
    plan.add_atoms(&atoms(&["app-editors/vim"])?, false)?;

    let ops: Vec<String> = plan.iter_ops(false).map(|op| op.to_string()).collect();
    assert_eq!(
        ops,
        vec![
            "replace dev-libs/libsodium-1.0.18:0::vdb with dev-libs/libsodium-1.0.19:0::gentoo",
            "install dev-util/pkgconf-2.1:0::gentoo",
            "install virtual/pkgconfig-3:0::gentoo",
            "install sys-libs/ncurses-6.4:0::gentoo",
            "install app-editors/vim-9.1:0::gentoo",
        ]
    );
    Ok(())
}

#[test]
fn test_slots_install_side_by_side() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let gentoo = write(dir.path(), "gentoo.json", GENTOO)?;
    let vdb = write(dir.path(), "vdb.json", VDB)?;

    let mut plan = MergePlan::new(
        vec![load(&vdb)?, load(&gentoo)?],
        Policy::highest(),
        ResolverConfig::default(),
    );
    plan.add_atoms(&atoms(&["dev-lang/python:3.12", "dev-lang/python:3.11"])?, true)?;

    let ops: Vec<Operation> = plan.iter_ops(false).collect();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].to_string(), "install dev-lang/python-3.12.1:3.12::gentoo");

    let installed: Vec<String> = plan
        .iter_ops(true)
        .filter_map(|op| op.target().cloned())
        .filter(|pkg| pkg.repo().livefs())
        .map(|pkg| pkg.cpv().to_string())
        .collect();
    assert!(installed.contains(&"dev-lang/python-3.11.7".to_string()));
    assert!(installed.contains(&"sys-apps/portage-3.0.60".to_string()));
    Ok(())
}

#[test]
fn test_ignore_failures_by_resetting() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let gentoo = write(dir.path(), "gentoo.json", GENTOO)?;

    let mut plan = MergePlan::new(vec![load(&gentoo)?], Policy::highest(), ResolverConfig::default());
    let mut failed = Vec::new();
    for atom in atoms(&["dev-util/pkgconf", "app-misc/missing", "dev-libs/libsodium"])? {
        let mark = plan.current_mark();
        if let Err(failure) = plan.add_atoms(std::slice::from_ref(&atom), false) {
            assert_eq!(failure.trace.reason, FailureReason::NoMatches);
            failed.push(failure.atom);
            plan.reset(mark);
        }
    }

    assert_eq!(failed, atoms(&["app-misc/missing"])?);
    let ops: Vec<String> = plan.iter_ops(false).map(|op| op.to_string()).collect();
    assert_eq!(
        ops,
        vec![
            "install dev-util/pkgconf-2.1:0::gentoo",
            "install dev-libs/libsodium-1.0.19:0::gentoo",
        ]
    );
    Ok(())
}

#[test]
fn test_config_from_file_enables_drop_cycles() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let repo = write(
        dir.path(),
        "cycle.json",
        r#"{
            "name": "gentoo",
            "packages": [
                { "cpv": "dev-python/a-1", "rdepend": "dev-python/b" },
                { "cpv": "dev-python/b-1", "rdepend": "dev-python/a" }
            ]
        }"#,
    )?;
    let config = write(dir.path(), "resolver.toml", "drop-cycles = true\n")?;

    let config = ResolverConfig::from_path(&config)?;
    assert!(config.drop_cycles);

    let mut plan = MergePlan::new(vec![load(&repo)?], Policy::highest(), config);
    plan.add_atoms(&atoms(&["dev-python/a"])?, false)?;
    assert_eq!(plan.iter_ops(false).count(), 2);
    Ok(())
}

#[test]
fn test_invalid_repository_document() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let broken = write(dir.path(), "broken.json", r#"{ "name": "gentoo", "packages": [ { "cpv": "nocategory" } ] }"#)?;
    assert!(MemoryRepository::from_path(&broken).is_err());

    let truncated = write(dir.path(), "truncated.json", r#"{ "name": "#)?;
    assert!(MemoryRepository::from_path(&truncated).is_err());
    Ok(())
}
