/// Commands handled outside the download pipeline. Any other text is
/// treated as a candidate link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.trim().split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Command::Start),
            "status" => Some(Command::Status),
            _ => None,
        }
    }
}
