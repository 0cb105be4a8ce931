//! Host-side prerequisites.

/// Packages that must exist on the host before host or guest actions work.
///
/// This is a declaration only; installing them is left to the caller.
pub trait Dependencies {
    /// Package names, in install order.
    fn dependencies(&self) -> Vec<String>;
}

/// Merge the dependencies of several providers, keeping first-seen order.
pub fn collect_dependencies(providers: &[&dyn Dependencies]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for provider in providers {
        for dep in provider.dependencies() {
            if !merged.contains(&dep) {
                merged.push(dep);
            }
        }
    }
    merged
}
