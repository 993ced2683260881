use uuid::Uuid;

/// The two identifiers a launched worker is born with. Without them the
/// worker cannot know which record it owns, so absence or malformed
/// values is fatal at startup, before anything is touched.
#[derive(Debug, Clone, Copy)]
pub struct WorkerTarget {
    pub lead_list_id: Uuid,
    pub correlation_id: Uuid,
}

impl WorkerTarget {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(
            std::env::var("LEADLIST_ID").ok().as_deref(),
            std::env::var("CORRELATION_ID").ok().as_deref(),
        )
    }

    fn from_values(
        lead_list_id: Option<&str>,
        correlation_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let lead_list_id = parse_required("LEADLIST_ID", lead_list_id)?;
        let correlation_id = parse_required("CORRELATION_ID", correlation_id)?;
        Ok(Self {
            lead_list_id,
            correlation_id,
        })
    }
}

fn parse_required(name: &str, value: Option<&str>) -> anyhow::Result<Uuid> {
    let value = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("{name} environment variable is not set"))?;

    Uuid::parse_str(value).map_err(|_| anyhow::anyhow!("{name} is not a valid UUID: '{value}'"))
}
