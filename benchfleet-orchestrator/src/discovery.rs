//! Benchmark discovery
//!
//! Builds the catalog from `go test -list` run in the project checkout.

use anyhow::{Context, Result, bail};
use benchfleet_core::domain::{Benchmark, Catalog};
use benchfleet_core::schedule::NameFilter;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Name fragments of benchmarks that do not measure speed
const NON_PERFORMANCE: [&str; 2] = ["BenchmarkSize", "BenchmarkMemory"];

/// Lists the benchmarks of the project and applies the filters
///
/// # Arguments
/// * `project_path` - Checkout of the project under test
/// * `base_package` - Package tree to search, the whole module when empty
/// * `bench` - Go `-bench` style expression restricting the catalog
/// * `envs` - Environment passed to the go tool
pub async fn discover(
    project_path: &Path,
    base_package: &str,
    bench: &str,
    envs: &[(String, String)],
) -> Result<Catalog> {
    let filter = NameFilter::new(bench)
        .with_context(|| format!("Invalid benchmark filter '{}'", bench))?;
    let target = package_target(base_package);

    info!("Listing benchmarks of {} in {}", target, project_path.display());
    let output = Command::new("go")
        .args(["test", "-list", "^Benchmark", &target])
        .current_dir(project_path)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .output()
        .await
        .context("Failed to run go test -list")?;

    if !output.status.success() {
        bail!(
            "go test -list exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let listed = parse_listing(&String::from_utf8_lossy(&output.stdout), project_path);
    debug!("go test -list reported {} benchmarks", listed.len());

    let benchmarks = select(listed, &filter);
    if benchmarks.is_empty() {
        bail!("No benchmarks found in {}", project_path.display());
    }

    info!("Found {} benchmarks", benchmarks.len());
    Ok(Catalog::new(benchmarks))
}

fn package_target(base_package: &str) -> String {
    let base = base_package.trim().trim_end_matches('/');
    if base.is_empty() || base == "." {
        "./...".to_string()
    } else if base.ends_with("/...") {
        base.to_string()
    } else {
        format!("{}/...", base)
    }
}

/// Parses `go test -list` output
///
/// Benchmark names are printed before the `ok <package>` line of the package
/// they belong to.
pub fn parse_listing(output: &str, project_path: &Path) -> Vec<Benchmark> {
    let mut benchmarks = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("Benchmark") {
            pending.push(line.to_string());
        } else if let Some(rest) = line.strip_prefix("ok") {
            let Some(package) = rest.split_whitespace().next() else {
                continue;
            };
            benchmarks.extend(
                pending
                    .drain(..)
                    .map(|name| Benchmark::new(name, package, project_path)),
            );
        } else if line.starts_with('?') {
            pending.clear();
        }
    }

    benchmarks
}

/// Drops non-performance benchmarks and those not matching `filter`
fn select(benchmarks: Vec<Benchmark>, filter: &NameFilter) -> Vec<Benchmark> {
    benchmarks
        .into_iter()
        .filter(|b| {
            if NON_PERFORMANCE.iter().any(|frag| b.name.contains(frag)) {
                info!("Removing non performance benchmark {}", b.name);
                return false;
            }
            filter.matches(&b.name)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "BenchmarkSort\n\
        BenchmarkSizeOfTree\n\
        ok  \texample.com/proj/sort\t0.012s\n\
        ?   \texample.com/proj/cmd\t[no test files]\n\
        BenchmarkHash\n\
        BenchmarkMemoryFootprint\n\
        TestNotABenchmark\n\
        ok  \texample.com/proj/hash\t0.004s\n";

    #[test]
    fn test_parse_listing_assigns_packages() {
        let benchmarks = parse_listing(LISTING, Path::new("/proj"));
        let listed: Vec<_> = benchmarks
            .iter()
            .map(|b| (b.name.as_str(), b.package.as_str()))
            .collect();

        assert_eq!(
            listed,
            vec![
                ("BenchmarkSort", "example.com/proj/sort"),
                ("BenchmarkSizeOfTree", "example.com/proj/sort"),
                ("BenchmarkHash", "example.com/proj/hash"),
                ("BenchmarkMemoryFootprint", "example.com/proj/hash"),
            ]
        );
        assert_eq!(benchmarks[0].name_pattern, "^BenchmarkSort$");
        assert_eq!(benchmarks[0].project_path, Path::new("/proj"));
    }

    #[test]
    fn test_select_drops_non_performance_and_filters() {
        let benchmarks = parse_listing(LISTING, Path::new("/proj"));

        let all = select(benchmarks.clone(), &NameFilter::new(".").unwrap());
        let names: Vec<_> = all.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["BenchmarkSort", "BenchmarkHash"]);

        let only_hash = select(benchmarks, &NameFilter::new("Hash").unwrap());
        assert_eq!(only_hash.len(), 1);
        assert_eq!(only_hash[0].name, "BenchmarkHash");
    }

    #[test]
    fn test_package_target() {
        assert_eq!(package_target(""), "./...");
        assert_eq!(package_target("./internal/"), "./internal/...");
        assert_eq!(package_target("./pkg/..."), "./pkg/...");
    }
}
