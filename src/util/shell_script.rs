use std::io;

/// Builder for shell scripts that are executed via `sh -c` inside a container.
///
/// Invariants:
/// - Fragments must not contain `\n` or `\r`.
/// - Fragments are joined with `; ` into a single line suitable for `sh -c`.
/// - Compound constructs (if/then/fi) must stay inside a single fragment.
#[derive(Debug, Default)]
pub struct ShellScript {
    parts: Vec<String>,
}

impl ShellScript {
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn push(&mut self, cmd: impl Into<String>) -> &mut Self {
        self.parts.push(cmd.into());
        self
    }

    pub fn extend<I>(&mut self, cmds: I) -> &mut Self
    where
        I: IntoIterator<Item = String>,
    {
        for c in cmds {
            self.parts.push(c);
        }
        self
    }

    pub fn build(&self) -> io::Result<String> {
        for (i, p) in self.parts.iter().enumerate() {
            if p.contains('\n') || p.contains('\r') {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("shell script fragment {i} contains a newline; use atomic fragments"),
                ));
            }
        }
        Ok(self.parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_joins_fragments() {
        let mut sh = ShellScript::new();
        sh.push("cd /app").push("exec sh");
        assert_eq!(sh.build().expect("build"), "cd /app; exec sh");
    }

    #[test]
    fn test_build_rejects_multiline_fragment() {
        let mut sh = ShellScript::new();
        sh.extend(["echo ok".to_string(), "echo a\necho b".to_string()]);
        let err = sh.build().expect_err("newline");
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("fragment 1"));
    }
}
