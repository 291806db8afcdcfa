use serde::{Deserialize, Serialize};

/// Branding shown on the public site, edited from the studio.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub title: String,
    pub slogan: String,
    pub owner: String,
    pub domain: String,
    pub phone: String,
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: "시간의 적체미를 잇는 연구소".into(),
            slogan: "전통의 가치를 디지털의 지혜로 잇습니다.".into(),
            owner: "고산 큐레이터".into(),
            domain: "antique-korea.com".into(),
            phone: "010-0000-0000".into(),
        }
    }
}

/// Chat appraisals used on `date` (YYYY-MM-DD, local time).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DailyUsage {
    pub date: String,
    pub count: u32,
}
