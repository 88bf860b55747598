use sleuth_core::config::AppConfig;

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let mut checks = Vec::new();

    // 1. Model configured with a usable key
    checks.push(check_model(config));

    // 2. Search and news keys for the collectors
    checks.push(check_sources(config));

    // 3. Output dir writable
    checks.push(check_output(config));

    // 4. Retry backoff consistency
    checks.push(check_retry(config));

    // 5. Engine limits
    checks.push(check_engine(config));

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn usable_key(key: Option<&str>) -> bool {
    key.map_or(false, |k| !k.is_empty() && !k.starts_with("${"))
}

fn check_model(config: &AppConfig) -> CheckResult {
    let Some(model) = &config.model else {
        return CheckResult {
            label: "Model".into(),
            ok: true,
            detail: "Not configured (fallback mode)".into(),
        };
    };

    let local = model.base_url.as_deref().map_or(false, |u| u.contains("localhost"));
    if usable_key(model.api_key.as_deref()) || local {
        CheckResult {
            label: "Model".into(),
            ok: true,
            detail: format!(
                "{} ({}), {} fallback(s)",
                model.model_id,
                model.provider,
                config.fallback_models.len()
            ),
        }
    } else {
        CheckResult {
            label: "Model".into(),
            ok: false,
            detail: format!("No API key set for provider '{}'", model.provider),
        }
    }
}

fn check_sources(config: &AppConfig) -> CheckResult {
    let mut configured = Vec::new();
    let mut issues = Vec::new();

    match &config.search {
        Some(s) if usable_key(Some(&s.api_key)) => configured.push("search"),
        Some(_) => issues.push("search: empty or unexpanded api_key"),
        None => {}
    }
    match &config.news {
        Some(n) if usable_key(Some(&n.api_key)) => configured.push("news"),
        Some(_) => issues.push("news: empty or unexpanded api_key"),
        None => {}
    }

    if !issues.is_empty() {
        CheckResult {
            label: "Sources".into(),
            ok: false,
            detail: issues.join(", "),
        }
    } else if configured.is_empty() {
        CheckResult {
            label: "Sources".into(),
            ok: true,
            detail: "Keyless only (Reddit, arXiv)".into(),
        }
    } else {
        CheckResult {
            label: "Sources".into(),
            ok: true,
            detail: configured.join(", "),
        }
    }
}

fn check_output(config: &AppConfig) -> CheckResult {
    let dir = config.output_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult {
            label: "Output".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", dir.display(), e),
        };
    }

    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Output".into(),
                ok: true,
                detail: format!("{}", dir.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Output".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}

fn check_retry(config: &AppConfig) -> CheckResult {
    let Some(retry) = config.model.as_ref().and_then(|m| m.retry.as_ref()) else {
        return CheckResult {
            label: "Retry".into(),
            ok: true,
            detail: "Defaults".into(),
        };
    };

    if retry.initial_backoff_ms > retry.max_backoff_ms {
        CheckResult {
            label: "Retry".into(),
            ok: false,
            detail: format!(
                "initial_backoff_ms ({}) > max_backoff_ms ({})",
                retry.initial_backoff_ms, retry.max_backoff_ms
            ),
        }
    } else {
        CheckResult {
            label: "Retry".into(),
            ok: true,
            detail: format!(
                "{} retries, backoff {}..{}ms",
                retry.max_retries, retry.initial_backoff_ms, retry.max_backoff_ms
            ),
        }
    }
}

fn check_engine(config: &AppConfig) -> CheckResult {
    let engine = &config.engine;
    if engine.max_steps == 0 || engine.capability_timeout_secs == 0 {
        return CheckResult {
            label: "Engine".into(),
            ok: false,
            detail: "max_steps and capability_timeout_secs must be positive".into(),
        };
    }

    let mut zero: Vec<&str> = config
        .collectors
        .timeout_secs
        .iter()
        .filter(|(_, secs)| **secs == 0)
        .map(|(name, _)| name.as_str())
        .collect();
    if !zero.is_empty() {
        zero.sort_unstable();
        return CheckResult {
            label: "Engine".into(),
            ok: false,
            detail: format!("timeout_secs must be positive for: {}", zero.join(", ")),
        };
    }

    CheckResult {
        label: "Engine".into(),
        ok: true,
        detail: format!(
            "max {} steps, {}s per capability ({} override(s))",
            engine.max_steps,
            engine.capability_timeout_secs,
            config.collectors.timeout_secs.len()
        ),
    }
}
