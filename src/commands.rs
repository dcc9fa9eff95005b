/// Available commands and autocomplete logic

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "trending",
    aliases: &["t", "home"],
    description: "Trending this week",
  },
  Command {
    name: "top",
    aliases: &["top-rated", "best"],
    description: "Top rated movies",
  },
  Command {
    name: "popular",
    aliases: &["p", "pop"],
    description: "Popular right now",
  },
  Command {
    name: "movies",
    aliases: &["m", "browse"],
    description: "Browse all movies",
  },
  Command {
    name: "tv",
    aliases: &["shows", "series"],
    description: "Browse TV shows",
  },
  Command {
    name: "search",
    aliases: &["s", "find"],
    description: "Search the catalog: search <query>",
  },
  Command {
    name: "favorites",
    aliases: &["f", "fav", "favs"],
    description: "Your favorite movies",
  },
  Command {
    name: "watchlist",
    aliases: &["w", "watch"],
    description: "Movies to watch later",
  },
  Command {
    name: "profile",
    aliases: &["me", "account"],
    description: "Profile and stats",
  },
  Command {
    name: "settings",
    aliases: &["prefs", "config"],
    description: "Preferences",
  },
  Command {
    name: "login",
    aliases: &["signin"],
    description: "Sign in",
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Sign out",
  },
  Command {
    name: "clear-cache",
    aliases: &["cc", "reload"],
    description: "Drop cached responses",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit shimy",
  },
];

/// A command line split into the command word and its argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub name: String,
  pub args: String,
}

impl Invocation {
  /// Resolve the first word through names and aliases; unknown words are
  /// kept as typed.
  pub fn parse(input: &str) -> Self {
    let input = input.trim();
    let (word, args) = input.split_once(' ').unwrap_or((input, ""));
    let word = word.to_lowercase();
    let name = find(&word)
      .map(|cmd| cmd.name.to_string())
      .unwrap_or(word);
    Self {
      name,
      args: args.trim().to_string(),
    }
  }
}

/// Exact lookup by name or alias
pub fn find(word: &str) -> Option<&'static Command> {
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == word || cmd.aliases.contains(&word))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
      continue;
    }

    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("watchlist");
    assert_eq!(suggestions[0].name, "watchlist");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("f");
    assert_eq!(suggestions[0].name, "favorites");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("pop");
    assert_eq!(suggestions[0].name, "popular");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("rend");
    assert_eq!(suggestions[0].name, "trending");
  }

  #[test]
  fn test_invocation_resolves_alias_and_keeps_args() {
    assert_eq!(
      Invocation::parse("s  the dark knight "),
      Invocation {
        name: "search".to_string(),
        args: "the dark knight".to_string(),
      }
    );
    assert_eq!(Invocation::parse("FAV").name, "favorites");
    assert_eq!(Invocation::parse("nope").name, "nope");
  }
}
