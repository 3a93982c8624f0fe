//! CVSS v3 base score computation from a vector string.

/// Computes the base score of a `CVSS:3.0/...` or `CVSS:3.1/...` vector.
///
/// Returns `None` for other versions or vectors missing a base metric.
pub fn cvss_base_score(vector: &str) -> Option<f32> {
    let mut parts = vector.trim().split('/');
    let version = parts.next()?;
    if version != "CVSS:3.0" && version != "CVSS:3.1" {
        return None;
    }

    let metric = |name: &str| -> Option<String> {
        vector
            .split('/')
            .find_map(|p| p.strip_prefix(name).and_then(|v| v.strip_prefix(':')))
            .map(str::to_string)
    };

    let scope_changed = match metric("S")?.as_str() {
        "U" => false,
        "C" => true,
        _ => return None,
    };

    let av = match metric("AV")?.as_str() {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let ac = match metric("AC")?.as_str() {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let pr = match (metric("PR")?.as_str(), scope_changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };
    let ui = match metric("UI")?.as_str() {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let cia = |value: String| -> Option<f64> {
        match value.as_str() {
            "H" => Some(0.56),
            "L" => Some(0.22),
            "N" => Some(0.0),
            _ => None,
        }
    };
    let c = cia(metric("C")?)?;
    let i = cia(metric("I")?)?;
    let a = cia(metric("A")?)?;

    let iss = 1.0 - (1.0 - c) * (1.0 - i) * (1.0 - a);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02f64).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability = 8.22 * av * ac * pr * ui;

    if impact <= 0.0 {
        return Some(0.0);
    }

    let score = if scope_changed {
        round_up((1.08 * (impact + exploitability)).min(10.0))
    } else {
        round_up((impact + exploitability).min(10.0))
    };
    Some(score as f32)
}

/// Smallest number with one decimal place that is >= `value`.
fn round_up(value: f64) -> f64 {
    let int_input = (value * 100_000.0).round() as i64;
    if int_input % 10_000 == 0 {
        int_input as f64 / 100_000.0
    } else {
        ((int_input / 10_000) + 1) as f64 / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_network_vector() {
        assert_eq!(
            cvss_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"),
            Some(9.8)
        );
    }

    #[test]
    fn test_scope_changed_vector() {
        assert_eq!(
            cvss_base_score("CVSS:3.1/AV:N/AC:L/PR:N/UI:R/S:C/C:L/I:L/A:N"),
            Some(6.1)
        );
    }

    #[test]
    fn test_no_impact_scores_zero() {
        assert_eq!(
            cvss_base_score("CVSS:3.0/AV:L/AC:H/PR:H/UI:R/S:U/C:N/I:N/A:N"),
            Some(0.0)
        );
    }

    #[test]
    fn test_rejects_unsupported_vectors() {
        assert_eq!(cvss_base_score("AV:N/AC:L/Au:N/C:P/I:P/A:P"), None);
        assert_eq!(cvss_base_score("CVSS:3.1/AV:N/AC:L"), None);
        assert_eq!(cvss_base_score("not a vector"), None);
    }

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(4.0), 4.0);
        assert_eq!(round_up(4.02), 4.1);
        assert_eq!(round_up(4.000002), 4.0);
    }
}
