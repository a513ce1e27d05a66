// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

use rstest::rstest;

use super::ArgumentChain;

#[rstest]
#[case("ls")]
#[case("ls -la")]
#[case("sh /tmp/scripts/node.sh extra")]
#[case("a b c d e f")]
fn test_split_and_join(#[case] words: &str) {
    let chain = ArgumentChain::split(words);
    assert_eq!(chain.to_string(), words);
}

#[rstest]
fn test_split_program_and_args() {
    let chain = ArgumentChain::split("cat -n file");
    assert_eq!(chain.program(), "cat");
    assert_eq!(chain.args(), &["-n".to_string(), "file".to_string()]);
    assert_eq!(chain.len(), 3);
}

#[rstest]
fn test_split_preserves_empty_tokens() {
    let chain = ArgumentChain::split("echo  hi ");
    assert_eq!(chain.tokens(), &["echo", "", "hi", ""]);
}

#[rstest]
fn test_split_empty_string() {
    let chain = ArgumentChain::split("");
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.program(), "");
    assert!(chain.args().is_empty());
}

#[rstest]
fn test_append_adds_final_argument() {
    let base = ArgumentChain::split("sh node.sh");
    let chain = base.append("leaf");
    assert_eq!(chain.tokens(), &["sh", "node.sh", "leaf"]);
    assert_eq!(base.len(), 2, "original chain should be unchanged");
}

#[rstest]
fn test_new_has_only_program() {
    let chain = ArgumentChain::new("true").append(".");
    assert_eq!(chain.program(), "true");
    assert_eq!(chain.args(), &[".".to_string()]);
}

#[rstest]
fn test_empty_chain() {
    let chain = ArgumentChain::default();
    assert!(chain.is_empty());
    assert_eq!(chain.program(), "");
    assert!(chain.args().is_empty());
}
