// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

#[cfg(test)]
#[path = "./args_test.rs"]
mod args_test;

/// The command line used to spawn a single node process.
///
/// The first token is the program to execute, the rest are passed
/// to it as arguments. Chains are built from a command string printed
/// by another node, and then extended with the path segment being
/// resolved.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArgumentChain {
    tokens: Vec<String>,
}

impl ArgumentChain {
    /// Create a chain that runs a single program with no arguments
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            tokens: vec![program.into()],
        }
    }

    /// Split a command string into tokens on every ASCII space.
    ///
    /// No quoting, escaping or expansion is performed. Consecutive
    /// spaces produce empty tokens rather than being merged, because
    /// backing commands may depend on the exact shape of their argv.
    pub fn split(words: &str) -> Self {
        words.split(' ').collect()
    }

    /// Return a new chain with one more token at the end
    pub fn append<S: Into<String>>(&self, token: S) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend(self.tokens.iter().cloned());
        tokens.push(token.into());
        Self { tokens }
    }

    /// The program to be executed, or an empty string for an empty chain
    pub fn program(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or_default()
    }

    /// The arguments that follow the program name
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }

    /// All tokens, program first
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The number of tokens in this chain, including the program
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if this chain has no program to run
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ArgumentChain {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for ArgumentChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}
