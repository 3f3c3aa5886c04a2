//! `go test -bench` output parsing

use benchfleet_core::domain::Measurement;

use super::Slot;

/// One result line, e.g. `BenchmarkSort-8   	  120032	      9876 ns/op	  128 B/op`
#[derive(Debug, Clone, PartialEq)]
pub struct BenchLine {
    pub name: String,
    pub iterations: u64,
    pub ns_per_op: f64,
}

/// Parses a result line
///
/// Returns `None` for lines that start like a benchmark but carry no result,
/// such as the name line printed before a benchmark's own log output.
pub fn parse_bench_line(line: &str) -> Option<BenchLine> {
    let mut fields = line.split_whitespace();
    let name = fields.next().filter(|n| n.starts_with("Benchmark"))?;
    let iterations = fields.next()?.parse::<u64>().ok()?;

    let rest: Vec<&str> = fields.collect();
    let ns_per_op = rest
        .chunks_exact(2)
        .find(|pair| pair[1] == "ns/op")
        .and_then(|pair| pair[0].parse::<f64>().ok())?;

    Some(BenchLine {
        name: name.to_string(),
        iterations,
        ns_per_op,
    })
}

/// Turns the output of one `go test` invocation into measurements
///
/// # Arguments
/// * `output` - Combined output of the invocation
/// * `duration_slot` - 1-based position of the invocation within the execution duration
/// * `slot` - Schedule position of the execution
pub fn parse_output(output: &str, duration_slot: u32, slot: &Slot) -> Vec<Measurement> {
    output
        .lines()
        .filter(|line| line.starts_with("Benchmark"))
        .filter_map(parse_bench_line)
        .enumerate()
        .map(|(i, line)| Measurement {
            iterations: line.iterations,
            ns_per_op: line.ns_per_op,
            duration_slot,
            iteration_index: slot.iteration_index,
            suite_run_index: slot.suite_run_index,
            repetition_index: i as u32 + 1,
            revision_tag: slot.tag.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "goos: linux\n\
        goarch: amd64\n\
        pkg: example.com/proj/sort\n\
        cpu: Intel(R) Xeon(R) CPU @ 2.20GHz\n\
        BenchmarkSort/size=10-2         \t 5242120\t       228.9 ns/op\t      80 B/op\t       1 allocs/op\n\
        BenchmarkSort/size=1000-2\n\
            sort_test.go:41: warming up\n\
        BenchmarkSort/size=1000-2       \t   20563\t     58212 ns/op\n\
        PASS\n\
        ok  \texample.com/proj/sort\t3.412s\n";

    #[test]
    fn test_parse_bench_line() {
        let line = parse_bench_line("BenchmarkHash-8   \t  120032\t      9876 ns/op\t  128 B/op")
            .unwrap();
        assert_eq!(line.name, "BenchmarkHash-8");
        assert_eq!(line.iterations, 120032);
        assert_eq!(line.ns_per_op, 9876.0);

        assert!(parse_bench_line("BenchmarkHash-8").is_none());
        assert!(parse_bench_line("BenchmarkHash-8 12 34 B/op").is_none());
        assert!(parse_bench_line("ok  \texample.com/x\t0.1s").is_none());
    }

    #[test]
    fn test_parse_output() {
        let slot = Slot {
            iteration_index: 2,
            suite_run_index: 3,
            tag: "v1.1.0".to_string(),
        };
        let measurements = parse_output(OUTPUT, 4, &slot);

        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].iterations, 5242120);
        assert_eq!(measurements[0].ns_per_op, 228.9);
        assert_eq!(measurements[0].repetition_index, 1);
        assert_eq!(measurements[1].ns_per_op, 58212.0);
        assert_eq!(measurements[1].repetition_index, 2);
        assert!(measurements.iter().all(|m| m.duration_slot == 4
            && m.iteration_index == 2
            && m.suite_run_index == 3
            && m.revision_tag == "v1.1.0"));
    }
}
