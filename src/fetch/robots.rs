// src/fetch/robots.rs
//! Minimal robots.txt evaluation: pick the group for our agent (else `*`),
//! longest matching Allow/Disallow wins, ties go to Allow.

use regex::Regex;

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    pattern: String,
    matcher: Option<Regex>,
}

impl Rule {
    fn new(allow: bool, pattern: &str) -> Self {
        let wildcard = pattern.contains('*') || pattern.ends_with('$');
        let matcher = wildcard.then(|| {
            let anchored = pattern.ends_with('$');
            let body = pattern.trim_end_matches('$');
            let escaped: Vec<String> = body.split('*').map(regex::escape).collect();
            let mut re = format!("^{}", escaped.join(".*"));
            if anchored {
                re.push('$');
            }
            Regex::new(&re).ok()
        });
        Self {
            allow,
            pattern: pattern.to_string(),
            matcher: matcher.flatten(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Some(re) => re.is_match(path),
            None => path.starts_with(&self.pattern),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<Rule>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt for `user_agent` (the product token is matched case-insensitively).
    pub fn parse(txt: &str, user_agent: &str) -> Self {
        let agent = user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        // (agents, rules) groups
        let mut groups: Vec<(Vec<String>, Vec<Rule>)> = Vec::new();
        let mut in_agents = false;

        for line in txt.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if !in_agents {
                        groups.push((Vec::new(), Vec::new()));
                        in_agents = true;
                    }
                    if let Some((agents, _)) = groups.last_mut() {
                        agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    in_agents = false;
                    // empty Disallow means "allow everything"
                    if value.is_empty() {
                        continue;
                    }
                    if let Some((_, rules)) = groups.last_mut() {
                        rules.push(Rule::new(key == "allow", value));
                    }
                }
                _ => in_agents = false,
            }
        }

        let specific = groups
            .iter()
            .find(|(agents, _)| agents.iter().any(|a| a != "*" && !agent.is_empty() && agent.contains(a.as_str())));
        let chosen = specific.or_else(|| groups.iter().find(|(agents, _)| agents.iter().any(|a| a == "*")));

        Self {
            rules: chosen.map(|(_, r)| r.clone()).unwrap_or_default(),
        }
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let best = self
            .rules
            .iter()
            .filter(|r| r.matches(path))
            .max_by(|a, b| {
                a.pattern
                    .len()
                    .cmp(&b.pattern.len())
                    .then(a.allow.cmp(&b.allow))
            });
        best.map(|r| r.allow).unwrap_or(true)
    }
}
