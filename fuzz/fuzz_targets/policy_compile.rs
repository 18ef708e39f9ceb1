#![no_main]

use bandicoot_core::event::EventStatus;
use bandicoot_core::types::ContainerMetadata;
use bandicoot_policy::{PolicyCompiler, RuleAction, compile_document};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };

    let appended = compile_document(raw, RuleAction::Append);
    let deleted = compile_document(raw, RuleAction::Delete);

    // 같은 문서는 액션만 다른 동일한 디렉티브를 만들어야 함
    match (appended, deleted) {
        (Ok(a), Ok(d)) => {
            assert_eq!(a.len(), d.len());
            for (a, d) in a.iter().zip(&d) {
                assert_eq!(a.chain, d.chain);
                assert_eq!(a.directives, d.directives);
                assert!(!a.directives.is_empty());
            }
        }
        (Err(_), Err(_)) => {}
        (a, d) => panic!("append/delete disagree: {a:?} vs {d:?}"),
    }

    let container = ContainerMetadata::new("f00d", "fuzz").with_label("io.bandicoot.rules", raw);
    let compiler = PolicyCompiler::default();
    let _ = compiler.compile(&container, &EventStatus::Started);
    let _ = compiler.compile(&container, &EventStatus::Other(raw.to_owned()));
});
