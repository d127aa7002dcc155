use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dynomite::{
    dynamodb::{
        AttributeValue, DynamoDb, DynamoDbClient, GetItemError, GetItemInput, PutItemError,
        PutItemInput,
    },
    Attribute, AttributeError, Attributes, FromAttributes, Item,
};
use rusoto_core::{Region, RusotoError};
use std::collections::HashMap;
use tracing::debug;

use super::{LeaseRecord, LeaseStore, LeaseVersion, VersionedLease};
use crate::error::StoreError;

static PARTITION_KEY: &str = "lease_name";

#[derive(Item, Debug, Clone, PartialEq)]
struct LeaseItem {
    #[dynomite(partition_key)]
    lease_name: String,
    holder_identity: String,
    lease_duration_seconds: u32,
    acquire_time_millis: i64,
    renew_time_millis: i64,
    leader_transitions: u64,
    version: u64,
}

impl LeaseItem {
    fn new(name: &str, record: &LeaseRecord, version: u64) -> Self {
        Self {
            lease_name: name.to_string(),
            holder_identity: record.holder_identity.clone(),
            lease_duration_seconds: record.lease_duration_seconds,
            acquire_time_millis: record.acquire_time.timestamp_millis(),
            renew_time_millis: record.renew_time.timestamp_millis(),
            leader_transitions: record.leader_transitions,
            version,
        }
    }

    fn into_versioned(self) -> Result<VersionedLease, StoreError> {
        let record = LeaseRecord {
            holder_identity: self.holder_identity,
            lease_duration_seconds: self.lease_duration_seconds,
            acquire_time: from_millis("acquire_time_millis", self.acquire_time_millis)?,
            renew_time: from_millis("renew_time_millis", self.renew_time_millis)?,
            leader_transitions: self.leader_transitions,
        };
        record.validate()?;

        Ok(VersionedLease {
            record,
            version: LeaseVersion::new(self.version.to_string()),
        })
    }
}

fn from_millis(field: &str, millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        StoreError::malformed(format!("'{}' is out of range: {}", field, millis))
    })
}

fn decode_error(err: AttributeError) -> StoreError {
    match err {
        AttributeError::InvalidFormat => {
            StoreError::malformed("Attribute contains an invalid format")
        }
        AttributeError::InvalidType => StoreError::malformed("Attribute contains invalid type"),
        AttributeError::MissingField { name } => {
            StoreError::malformed(format!("Attribute '{}' was missing", name))
        }
    }
}

/// [`LeaseStore`] backed by a DynamoDB table keyed on `lease_name`.
///
/// Reads are strongly consistent. Writes are conditional puts: create
/// requires the item to be absent, update requires the stored numeric
/// `version` attribute to equal the expected token.
#[derive(Clone)]
pub struct DynamoDbLeaseStore {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbLeaseStore {
    pub fn new(client: DynamoDbClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn from_region(region: Region, table_name: impl Into<String>) -> Self {
        Self::new(DynamoDbClient::new(region), table_name)
    }

    async fn put(
        &self,
        name: &str,
        item: LeaseItem,
        condition_expression: String,
        expression_attribute_names: Option<HashMap<String, String>>,
        expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    ) -> Result<LeaseVersion, StoreError> {
        let version = item.version;
        let attrs: Attributes = item.into();
        let input = PutItemInput {
            table_name: self.table_name.clone(),
            item: attrs,
            condition_expression: Some(condition_expression),
            expression_attribute_names,
            expression_attribute_values,
            ..PutItemInput::default()
        };

        match self.client.put_item(input).await {
            Ok(_) => Ok(LeaseVersion::new(version.to_string())),
            Err(RusotoError::Service(PutItemError::ConditionalCheckFailed(message))) => {
                debug!(lease = %name, %message, "conditional lease write rejected");
                Err(StoreError::conflict(name))
            }
            Err(err) => Err(StoreError::unavailable(format!(
                "failed to write lease '{}': {}",
                name, err
            ))),
        }
    }
}

#[async_trait]
impl LeaseStore for DynamoDbLeaseStore {
    async fn get(&self, name: &str) -> Result<Option<VersionedLease>, StoreError> {
        let mut key = HashMap::new();
        key.insert(PARTITION_KEY.to_string(), name.to_string().into_attr());
        let input = GetItemInput {
            table_name: self.table_name.clone(),
            key,
            consistent_read: Some(true),
            ..GetItemInput::default()
        };

        let output = match self.client.get_item(input).await {
            Ok(output) => output,
            Err(RusotoError::Service(GetItemError::ResourceNotFound(message))) => {
                return Err(StoreError::unavailable(format!(
                    "lease table '{}' not found: {}",
                    self.table_name, message
                )))
            }
            Err(err) => {
                return Err(StoreError::unavailable(format!(
                    "failed to read lease '{}': {}",
                    name, err
                )))
            }
        };

        match output.item {
            Some(attrs) => LeaseItem::from_attrs(attrs)
                .map_err(decode_error)?
                .into_versioned()
                .map(Some),
            None => Ok(None),
        }
    }

    async fn create(&self, name: &str, record: &LeaseRecord) -> Result<LeaseVersion, StoreError> {
        record.validate()?;
        self.put(
            name,
            LeaseItem::new(name, record, 1),
            format!("attribute_not_exists({})", PARTITION_KEY),
            None,
            None,
        )
        .await
    }

    async fn update(
        &self,
        name: &str,
        record: &LeaseRecord,
        expected: &LeaseVersion,
    ) -> Result<LeaseVersion, StoreError> {
        record.validate()?;
        let expected_version = expected.as_str().parse::<u64>().map_err(|err| {
            StoreError::malformed(format!("invalid lease version '{}': {}", expected, err))
        })?;

        let mut names = HashMap::new();
        names.insert("#version".to_string(), "version".to_string());
        let mut values = HashMap::new();
        values.insert(":expected".to_string(), expected_version.into_attr());

        self.put(
            name,
            LeaseItem::new(name, record, expected_version.saturating_add(1)),
            "#version = :expected".to_string(),
            Some(names),
            Some(values),
        )
        .await
    }
}
