use std::collections::HashMap;
use std::error::Error;
use std::io::Write;
use std::process::{Command, Stdio};

/// One pathway the filter nominated for removal, with the confidence and
/// bin it reported for the nomination.
#[derive(Debug, Clone, PartialEq)]
pub struct Nomination {
    pub pathway: String,
    pub confidence: f64,
    pub bin: u32,
}

pub type FilterResult = Result<Vec<Nomination>, Box<dyn Error + Send + Sync>>;

/// The optional permutation-based significance filter. Injected so the
/// keep/remove decision can be tested without an external process.
pub trait SignificanceFilter: Sync {
    fn run(&self, coverages: &[(String, f64)]) -> FilterResult;
}

/// Pairs the filter's two streams into nominations: the diagnostic stream
/// names candidate pathways to remove, the standard stream carries
/// `pathway \t confidence \t bin` for each. Candidates without a
/// confidence/bin line are dropped.
pub fn parse_filter_output(stdout: &str, stderr: &str) -> Vec<Nomination> {
    let mut scored: HashMap<&str, (f64, u32)> = HashMap::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            continue;
        }
        let (Ok(confidence), Ok(bin)) =
            (fields[1].trim().parse::<f64>(), fields[2].trim().parse::<u32>())
        else {
            continue;
        };
        scored.insert(fields[0].trim(), (confidence, bin));
    }

    let mut nominations = Vec::new();
    for line in stderr.lines() {
        let Some(candidate) = line.split_whitespace().next() else {
            continue;
        };
        if let Some((confidence, bin)) = scored.get(candidate) {
            nominations.push(Nomination {
                pathway: candidate.to_string(),
                confidence: *confidence,
                bin: *bin,
            });
        }
    }
    nominations
}

/// Removes nominated pathways from both tables, but only when the
/// nomination's confidence reaches `probability_threshold` and its bin
/// equals `target_bin` - a nominated pathway failing either check is kept.
/// Returns the removed pathway ids.
pub fn apply_nominations(
    nominations: &[Nomination],
    probability_threshold: f64,
    target_bin: u32,
    abundance: &mut HashMap<String, f64>,
    coverage: &mut HashMap<String, f64>,
) -> Vec<String> {
    let mut removed = Vec::new();
    for nomination in nominations {
        if nomination.confidence >= probability_threshold && nomination.bin == target_bin {
            abundance.remove(&nomination.pathway);
            coverage.remove(&nomination.pathway);
            removed.push(nomination.pathway.clone());
        }
    }
    removed
}

/// Runs the filter as a subprocess, feeding `pathway \t coverage` lines on
/// stdin and reading nominations back from its two output streams.
pub struct SubprocessFilter {
    command: String,
}

impl SubprocessFilter {
    pub fn new(command: &str) -> Self {
        SubprocessFilter {
            command: command.to_string(),
        }
    }
}

impl SignificanceFilter for SubprocessFilter {
    fn run(&self, coverages: &[(String, f64)]) -> FilterResult {
        let mut child = Command::new(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or("cannot open significance filter stdin")?;
            for (pathway, coverage) in coverages {
                writeln!(stdin, "{}\t{}", pathway, coverage)?;
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(format!(
                "significance filter failed with status: {}",
                output.status
            )
            .into());
        }
        Ok(parse_filter_output(
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_output_pairs_streams() {
        let stdout = "PWY1\t0.97\t1\nPWY2\t0.40\t1\nnoise line\n";
        let stderr = "PWY1\nPWY2 commentary\nPWY3\n";
        let nominations = parse_filter_output(stdout, stderr);
        assert_eq!(nominations.len(), 2);
        assert_eq!(
            nominations[0],
            Nomination {
                pathway: "PWY1".to_string(),
                confidence: 0.97,
                bin: 1,
            }
        );
        // PWY3 has no confidence/bin line and is dropped
        assert!(!nominations.iter().any(|n| n.pathway == "PWY3"));
    }

    #[test]
    fn test_apply_nominations_requires_confidence_and_bin() {
        let nominations = vec![
            Nomination {
                pathway: "PWY1".to_string(),
                confidence: 0.97,
                bin: 1,
            },
            Nomination {
                pathway: "PWY2".to_string(),
                confidence: 0.40,
                bin: 1,
            },
            Nomination {
                pathway: "PWY3".to_string(),
                confidence: 0.99,
                bin: 2,
            },
        ];
        let mut abundance: HashMap<String, f64> = ["PWY1", "PWY2", "PWY3"]
            .iter()
            .map(|p| (p.to_string(), 1.0))
            .collect();
        let mut coverage = abundance.clone();

        let removed = apply_nominations(&nominations, 0.9, 1, &mut abundance, &mut coverage);
        // only PWY1 passes both checks
        assert_eq!(removed, vec!["PWY1".to_string()]);
        assert!(!abundance.contains_key("PWY1"));
        assert!(!coverage.contains_key("PWY1"));
        assert!(abundance.contains_key("PWY2"));
        assert!(abundance.contains_key("PWY3"));
    }
}
