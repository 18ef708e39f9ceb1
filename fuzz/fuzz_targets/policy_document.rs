#![no_main]

use arbitrary::Arbitrary;
use bandicoot_policy::{RuleAction, compile_document};
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value, json};

/// 퍼저용 구조적 입력: 거의 올바른 정책 문서
#[derive(Arbitrary, Debug)]
struct FuzzDocument {
    /// (체인 키, 규칙 목록)
    chains: Vec<(String, Vec<FuzzRule>)>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    description: String,
    protocol: Option<String>,
    port: FuzzPort,
    match_module: Option<String>,
    states: Option<Vec<String>>,
    target: Option<String>,
}

#[derive(Arbitrary, Debug)]
enum FuzzPort {
    Int(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl FuzzRule {
    fn to_value(&self) -> Value {
        let mut options = Map::new();
        if let Some(p) = &self.protocol {
            options.insert("protocol".to_owned(), json!(p));
        }
        match &self.port {
            FuzzPort::Int(n) => {
                options.insert("destinationPort".to_owned(), json!(n));
            }
            FuzzPort::Float(f) => {
                options.insert("destinationPort".to_owned(), json!(f));
            }
            FuzzPort::Text(s) => {
                options.insert("destinationPort".to_owned(), json!(s));
            }
            FuzzPort::Missing => {}
        }
        if let Some(m) = &self.match_module {
            options.insert("match".to_owned(), json!(m));
        }
        if let Some(s) = &self.states {
            options.insert("connectionStates".to_owned(), json!(s));
        }
        if let Some(t) = &self.target {
            options.insert("target".to_owned(), json!(t));
        }
        Value::Object(options)
    }
}

fuzz_target!(|input: FuzzDocument| {
    // 체인 8개, 체인당 규칙 8개로 제한
    let mut document = Map::new();
    for (chain, rules) in input.chains.iter().take(8) {
        let mut rule_map = Map::new();
        for rule in rules.iter().take(8) {
            rule_map.insert(rule.description.clone(), rule.to_value());
        }
        document.insert(chain.clone(), Value::Object(rule_map));
    }
    let raw = Value::Object(document).to_string();

    if let Ok(rules) = compile_document(&raw, RuleAction::Append) {
        for rule in &rules {
            for directive in &rule.directives {
                // 포트 인자는 항상 1..=65535 범위의 정수
                let port: u16 = directive.args()[3].parse().expect("numeric port");
                assert!(port >= 1);
            }
        }
    }
});
