/// Ordered allow-list of game titles, matched by case-insensitive substring
/// containment: an activity named "Persona 5 Royal (PC)" matches the title
/// "persona 5".
#[derive(Debug, Clone)]
pub struct TitleMatcher {
    titles: Vec<String>,
    lowered: Vec<String>,
}

/// An observed activity that matched the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    /// Activity name exactly as the platform reported it; this is the ledger key.
    pub activity: String,
    /// The allow-list entry that matched.
    pub title: String,
}

impl TitleMatcher {
    pub fn new<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let titles: Vec<String> = titles
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .collect();
        let lowered = titles.iter().map(|t| t.to_lowercase()).collect();
        Self { titles, lowered }
    }

    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    /// First allow-list entry (in list order) contained in `activity`.
    pub fn title_for(&self, activity: &str) -> Option<&str> {
        let name = activity.to_lowercase();
        self.lowered
            .iter()
            .position(|t| name.contains(t.as_str()))
            .map(|i| self.titles[i].as_str())
    }

    /// Scans activities in presence order and returns the first one that matches.
    pub fn find<'a, I>(&self, activities: I) -> Option<TitleMatch>
    where
        I: IntoIterator<Item = &'a str>,
    {
        activities.into_iter().find_map(|activity| {
            self.title_for(activity).map(|title| TitleMatch {
                activity: activity.to_string(),
                title: title.to_string(),
            })
        })
    }
}
