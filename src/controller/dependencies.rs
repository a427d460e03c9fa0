//! Dependency gate between Apps of a namespace.

use kube::ResourceExt;

use crate::crd::{App, ReleaseState};

/// Whether `app` is deployed at the version it asks for.
pub fn is_installed_at_desired_version(app: &App) -> bool {
    app.status.as_ref().is_some_and(|s| {
        s.state() == Some(ReleaseState::Deployed) && s.version == app.spec.version
    })
}

/// Declared dependencies of `app` that are not yet installed at their
/// desired version, in declared order and without duplicates.
///
/// `siblings` are the Apps of the same namespace; a dependency with no
/// matching sibling counts as missing. A dependency on the App itself is
/// ignored.
pub fn missing_dependencies(app: &App, siblings: &[App]) -> Vec<String> {
    let name = app.name_any();
    let namespace = app.namespace();
    let mut missing: Vec<String> = Vec::new();

    for dep in &app.spec.depends_on {
        if *dep == name || missing.contains(dep) {
            continue;
        }
        let satisfied = siblings
            .iter()
            .filter(|s| s.namespace() == namespace)
            .find(|s| s.name_any() == *dep)
            .is_some_and(is_installed_at_desired_version);
        if !satisfied {
            missing.push(dep.clone());
        }
    }

    missing
}
