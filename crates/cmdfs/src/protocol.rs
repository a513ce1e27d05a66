// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0
// https://github.com/spkenv/spk

/// The first line printed by every node command, which
/// determines how the rest of its output is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The node is a directory; each following line names one entry
    Listing,
    /// The node is a directory whose children are resolved by
    /// the command string on the following line
    SubdirCommand,
    /// The node is a file whose content is produced by the command
    /// string on the following line
    FileCommand,
}

impl Classification {
    /// Identify a classification line, exactly as printed
    pub fn parse(line: &str) -> Option<Self> {
        match line {
            "!listing" => Some(Self::Listing),
            "!subdir_command" => Some(Self::SubdirCommand),
            "!file_command" => Some(Self::FileCommand),
            _ => None,
        }
    }

    /// The literal token for this classification
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "!listing",
            Self::SubdirCommand => "!subdir_command",
            Self::FileCommand => "!file_command",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::Classification;

    #[rstest]
    #[case("!listing", Some(Classification::Listing))]
    #[case("!subdir_command", Some(Classification::SubdirCommand))]
    #[case("!file_command", Some(Classification::FileCommand))]
    #[case("!listing ", None)]
    #[case("listing", None)]
    #[case("", None)]
    fn test_parse_classification(#[case] line: &str, #[case] expected: Option<Classification>) {
        assert_eq!(Classification::parse(line), expected);
    }
}
