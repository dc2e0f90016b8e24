//! 설정 관리.
//!
//! 기본값 → TOML 파일(선택) → `MART__` 환경변수 순으로 덮어씁니다.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::asset::AssetKeyPolicy;
use crate::domain::enrichment::MovingAverageWindows;
use crate::domain::fact::OrphanPolicy;
use crate::error::{MartError, MartResult};
use crate::logging::LogConfig;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/mart.toml";

/// 파이프라인 전체 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MartConfig {
    /// 원시 관측 테이블 설정
    pub source: SourceConfig,
    /// 출력 테이블 이름
    pub tables: TableNames,
    /// 파생 지표 설정
    pub enrichment: EnrichmentConfig,
    /// 자산 차원 설정
    pub assets: AssetConfig,
    /// 팩트 정합 설정
    pub reconcile: ReconcileConfig,
    /// 데이터베이스 연결 설정
    pub database: DatabaseConfig,
    /// 로깅 설정
    pub logging: LogConfig,
}

/// 원시 관측 테이블.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 원시 관측 relation 이름
    pub table: String,
    /// 적재 시각 컬럼
    pub load_ts_column: String,
    /// 소스 컬럼 (없으면 `unknown`)
    pub source_column: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table: "raw_prices".to_string(),
            load_ts_column: "load_ts".to_string(),
            source_column: Some("source".to_string()),
        }
    }
}

impl SourceConfig {
    /// 소스 컬럼 이름 (빈 문자열은 컬럼 없음으로 취급).
    pub fn source_column(&self) -> Option<&str> {
        self.source_column.as_deref().filter(|c| !c.is_empty())
    }
}

/// 출력 테이블 이름.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TableNames {
    pub dim_asset: String,
    pub dim_calendar: String,
    pub fact_prices: String,
    pub fact_prices_enriched: String,
    pub run_log: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            dim_asset: "dim_asset".to_string(),
            dim_calendar: "dim_calendar".to_string(),
            fact_prices: "fact_prices".to_string(),
            fact_prices_enriched: "fact_prices_enriched".to_string(),
            run_log: "etl_run_log".to_string(),
        }
    }
}

impl TableNames {
    /// 게시 대상 테이블 (실행 로그 제외).
    pub fn published(&self) -> [&str; 4] {
        [
            &self.dim_asset,
            &self.dim_calendar,
            &self.fact_prices,
            &self.fact_prices_enriched,
        ]
    }
}

/// 파생 지표 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// 이동평균 윈도우 길이 (거래일 수)
    pub ma_windows: Vec<usize>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            ma_windows: vec![7, 30],
        }
    }
}

impl EnrichmentConfig {
    pub fn windows(&self) -> MartResult<MovingAverageWindows> {
        MovingAverageWindows::new(self.ma_windows.clone())
    }
}

/// 자산 차원 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetConfig {
    pub key_policy: AssetKeyPolicy,
}

/// 팩트 정합 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub orphan_policy: OrphanPolicy,
}

/// 데이터베이스 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 획득 타임아웃 (초)
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            acquire_timeout_secs: 30,
        }
    }
}

impl MartConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> MartResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("MART")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("enrichment.ma_windows")
                    .try_parsing(true),
            );

        let config: MartConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// SQL에 삽입되는 식별자와 윈도우 설정을 검증합니다.
    pub fn validate(&self) -> MartResult<()> {
        let mut identifiers = vec![
            self.source.table.as_str(),
            self.source.load_ts_column.as_str(),
        ];
        if let Some(column) = self.source.source_column() {
            identifiers.push(column);
        }
        identifiers.extend(self.tables.published());
        identifiers.push(&self.tables.run_log);

        for ident in identifiers {
            if !is_valid_identifier(ident) {
                return Err(MartError::Config(format!("invalid SQL identifier: {:?}", ident)));
            }
        }

        self.enrichment.windows()?;
        Ok(())
    }
}

/// `schema.table` 형태까지 허용하는 단순 식별자 검사.
pub fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty()
        && ident.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MartConfig::default();
        assert_eq!(config.source.table, "raw_prices");
        assert_eq!(config.enrichment.ma_windows, vec![7, 30]);
        assert_eq!(config.assets.key_policy, AssetKeyPolicy::Preserve);
        assert_eq!(config.reconcile.orphan_policy, OrphanPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("raw_prices"));
        assert!(is_valid_identifier("public.raw_prices"));
        assert!(!is_valid_identifier("raw prices"));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("t; DROP TABLE x"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let mut config = MartConfig::default();
        config.tables.fact_prices = "fact prices".to_string();
        assert!(matches!(config.validate(), Err(MartError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[source]
table = "public.raw_prices"

[enrichment]
ma_windows = [20, 50]

[assets]
key_policy = "rank"

[reconcile]
orphan_policy = "flag"
"#
        )
        .unwrap();

        let config = MartConfig::load(file.path()).unwrap();
        assert_eq!(config.source.table, "public.raw_prices");
        assert_eq!(config.enrichment.ma_windows, vec![20, 50]);
        assert_eq!(config.assets.key_policy, AssetKeyPolicy::Rank);
        assert_eq!(config.reconcile.orphan_policy, OrphanPolicy::Flag);
        assert_eq!(config.tables.dim_asset, "dim_asset");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MartConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.tables.run_log, "etl_run_log");
    }
}
