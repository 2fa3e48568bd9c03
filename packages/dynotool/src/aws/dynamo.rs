//! `TableClient` over the DynamoDB SDK.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    self as sdk, AttributeValue, DeleteRequest, PutRequest, ReturnConsumedCapacity,
};
use aws_sdk_dynamodb::Client;

use super::{classify, AwsContext};
use crate::client::{ScanRequest, TableClient, TableNamePage};
use crate::error::{DynoError, Result};
use crate::types::{
    AttributeDefinition, BillingMode, IndexSchema, KeyElement, KeyType, PageResult, Projection, ScalarType,
    StreamSpec, TableSchema, TableStatus, TaggedRecord, TaggedValue, Throughput, WriteRequest,
};

type Item = HashMap<String, AttributeValue>;

pub struct DynamoClient {
    context: Arc<AwsContext>,
    client: Client,
}

impl DynamoClient {
    pub fn new(context: Arc<AwsContext>) -> Self {
        let client = Client::new(context.sdk_config());
        Self { context, client }
    }
}

impl TableClient for DynamoClient {
    fn describe_table(&self, table: &str) -> Result<Option<TableSchema>> {
        let response = self
            .context
            .block_on(self.client.describe_table().table_name(table).send());
        match response {
            Ok(output) => match output.table() {
                Some(description) => Ok(Some(schema_from_description(description)?)),
                None => Ok(None),
            },
            Err(err) => {
                let err = classify("DescribeTable", err);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn list_tables(&self, start: Option<&str>) -> Result<TableNamePage> {
        let output = self
            .context
            .block_on(
                self.client
                    .list_tables()
                    .set_exclusive_start_table_name(start.map(str::to_string))
                    .send(),
            )
            .map_err(|e| classify("ListTables", e))?;
        Ok(TableNamePage {
            names: output.table_names().to_vec(),
            last_evaluated: output.last_evaluated_table_name().map(str::to_string),
        })
    }

    fn scan(&self, request: &ScanRequest) -> Result<PageResult> {
        let mut call = self
            .client
            .scan()
            .table_name(&request.table)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .set_exclusive_start_key(request.continuation.as_ref().map(to_item))
            .set_limit(request.limit.map(|l| l as i32));
        if let Some(segment) = request.segment {
            call = call
                .segment(segment.index as i32)
                .total_segments(segment.total as i32);
        }
        if let Some(filter) = &request.filter {
            call = call.filter_expression(&filter.expression);
            if !filter.names.is_empty() {
                call = call.set_expression_attribute_names(Some(
                    filter.names.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                ));
            }
            if !filter.values.is_empty() {
                call = call.set_expression_attribute_values(Some(to_item(&filter.values)));
            }
        }

        let output = self
            .context
            .block_on(call.send())
            .map_err(|e| classify("Scan", e))?;

        let records = output
            .items()
            .iter()
            .map(from_item)
            .collect::<Result<Vec<_>>>()?;
        let continuation = match output.last_evaluated_key() {
            Some(key) if !key.is_empty() => Some(from_item(key)?),
            _ => None,
        };
        Ok(PageResult {
            count: output.count().max(0) as usize,
            scanned_count: output.scanned_count().max(0) as usize,
            consumed_capacity: output.consumed_capacity().and_then(|c| c.capacity_units()),
            records,
            continuation,
        })
    }

    fn put_item(&self, table: &str, item: &TaggedRecord) -> Result<()> {
        self.context
            .block_on(
                self.client
                    .put_item()
                    .table_name(table)
                    .set_item(Some(to_item(item)))
                    .send(),
            )
            .map_err(|e| classify("PutItem", e))?;
        Ok(())
    }

    fn batch_write(&self, table: &str, requests: &[WriteRequest]) -> Result<Vec<WriteRequest>> {
        let batch = requests
            .iter()
            .map(to_write_request)
            .collect::<Result<Vec<_>>>()?;
        let output = self
            .context
            .block_on(
                self.client
                    .batch_write_item()
                    .request_items(table, batch)
                    .send(),
            )
            .map_err(|e| classify("BatchWriteItem", e))?;

        let mut unprocessed = Vec::new();
        if let Some(pending) = output.unprocessed_items {
            for requests in pending.into_values() {
                for request in requests {
                    if let Some(put) = request.put_request {
                        unprocessed.push(WriteRequest::Put(from_item(&put.item)?));
                    }
                    if let Some(delete) = request.delete_request {
                        unprocessed.push(WriteRequest::Delete(from_item(&delete.key)?));
                    }
                }
            }
        }
        Ok(unprocessed)
    }

    fn create_table(&self, schema: &TableSchema) -> Result<TableStatus> {
        let provisioned = schema.billing_mode == BillingMode::Provisioned;
        let mut call = self
            .client
            .create_table()
            .table_name(&schema.name)
            .set_key_schema(Some(key_schema(&schema.key_schema)?))
            .set_attribute_definitions(Some(
                schema
                    .attribute_definitions
                    .iter()
                    .map(|d| {
                        sdk::AttributeDefinition::builder()
                            .attribute_name(&d.name)
                            .attribute_type(sdk::ScalarAttributeType::from(d.attribute_type.as_str()))
                            .build()
                            .map_err(build_error)
                    })
                    .collect::<Result<Vec<_>>>()?,
            ));
        if provisioned {
            call = call
                .billing_mode(sdk::BillingMode::Provisioned)
                .provisioned_throughput(throughput(&schema.throughput)?);
        } else {
            call = call.billing_mode(sdk::BillingMode::PayPerRequest);
        }

        if !schema.global_indexes.is_empty() {
            let mut indexes = Vec::with_capacity(schema.global_indexes.len());
            for index in &schema.global_indexes {
                let mut builder = sdk::GlobalSecondaryIndex::builder()
                    .index_name(&index.name)
                    .set_key_schema(Some(key_schema(&index.key_schema)?))
                    .projection(projection(&index.projection));
                if provisioned {
                    let units = index.throughput.unwrap_or(schema.throughput);
                    builder = builder.provisioned_throughput(throughput(&units)?);
                }
                indexes.push(builder.build().map_err(build_error)?);
            }
            call = call.set_global_secondary_indexes(Some(indexes));
        }
        if !schema.local_indexes.is_empty() {
            let indexes = schema
                .local_indexes
                .iter()
                .map(|index| {
                    sdk::LocalSecondaryIndex::builder()
                        .index_name(&index.name)
                        .set_key_schema(Some(key_schema(&index.key_schema)?))
                        .projection(projection(&index.projection))
                        .build()
                        .map_err(build_error)
                })
                .collect::<Result<Vec<_>>>()?;
            call = call.set_local_secondary_indexes(Some(indexes));
        }
        if let Some(stream) = schema.stream.as_ref().filter(|s| s.enabled) {
            let spec = sdk::StreamSpecification::builder()
                .stream_enabled(true)
                .set_stream_view_type(stream.view_type.as_deref().map(sdk::StreamViewType::from))
                .build()
                .map_err(build_error)?;
            call = call.stream_specification(spec);
        }

        let output = self
            .context
            .block_on(call.send())
            .map_err(|e| classify("CreateTable", e))?;
        Ok(output
            .table_description()
            .and_then(|d| d.table_status())
            .map(|s| TableStatus::parse(s.as_str()))
            .unwrap_or(TableStatus::Creating))
    }

    fn delete_table(&self, table: &str) -> Result<()> {
        self.context
            .block_on(self.client.delete_table().table_name(table).send())
            .map_err(|e| classify("DeleteTable", e))?;
        Ok(())
    }
}

// ── Attribute values ────────────────────────────────────────────────

pub(crate) fn to_attribute(value: &TaggedValue) -> AttributeValue {
    match value {
        TaggedValue::S(s) => AttributeValue::S(s.clone()),
        TaggedValue::N(n) => AttributeValue::N(n.clone()),
        TaggedValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
        TaggedValue::Bool(b) => AttributeValue::Bool(*b),
        TaggedValue::Null => AttributeValue::Null(true),
        TaggedValue::Ss(items) => AttributeValue::Ss(items.clone()),
        TaggedValue::Ns(items) => AttributeValue::Ns(items.clone()),
        TaggedValue::Bs(items) => AttributeValue::Bs(items.iter().map(|b| Blob::new(b.clone())).collect()),
        TaggedValue::L(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        TaggedValue::M(map) => AttributeValue::M(map.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect()),
    }
}

pub(crate) fn from_attribute(value: &AttributeValue) -> Result<TaggedValue> {
    Ok(match value {
        AttributeValue::S(s) => TaggedValue::S(s.clone()),
        AttributeValue::N(n) => TaggedValue::N(n.clone()),
        AttributeValue::B(b) => TaggedValue::B(b.as_ref().to_vec()),
        AttributeValue::Bool(b) => TaggedValue::Bool(*b),
        AttributeValue::Null(_) => TaggedValue::Null,
        AttributeValue::Ss(items) => TaggedValue::Ss(items.clone()),
        AttributeValue::Ns(items) => TaggedValue::Ns(items.clone()),
        AttributeValue::Bs(items) => TaggedValue::Bs(items.iter().map(|b| b.as_ref().to_vec()).collect()),
        AttributeValue::L(items) => TaggedValue::L(items.iter().map(from_attribute).collect::<Result<_>>()?),
        AttributeValue::M(map) => TaggedValue::M(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        other => return Err(DynoError::UnsupportedTag(format!("{:?}", other))),
    })
}

fn to_item(record: &TaggedRecord) -> Item {
    record.iter().map(|(k, v)| (k.clone(), to_attribute(v))).collect()
}

fn from_item(item: &Item) -> Result<TaggedRecord> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), from_attribute(v)?)))
        .collect()
}

fn to_write_request(request: &WriteRequest) -> Result<sdk::WriteRequest> {
    let builder = sdk::WriteRequest::builder();
    let builder = match request {
        WriteRequest::Put(record) => builder.put_request(
            PutRequest::builder()
                .set_item(Some(to_item(record)))
                .build()
                .map_err(build_error)?,
        ),
        WriteRequest::Delete(key) => builder.delete_request(
            DeleteRequest::builder()
                .set_key(Some(to_item(key)))
                .build()
                .map_err(build_error)?,
        ),
    };
    Ok(builder.build())
}

// ── Table definitions ───────────────────────────────────────────────

fn build_error(err: aws_sdk_dynamodb::error::BuildError) -> DynoError {
    DynoError::InvalidArgument(format!("cannot build request: {}", err))
}

fn key_schema(elements: &[KeyElement]) -> Result<Vec<sdk::KeySchemaElement>> {
    elements
        .iter()
        .map(|k| {
            sdk::KeySchemaElement::builder()
                .attribute_name(&k.attribute)
                .key_type(sdk::KeyType::from(k.key_type.as_str()))
                .build()
                .map_err(build_error)
        })
        .collect()
}

fn throughput(units: &Throughput) -> Result<sdk::ProvisionedThroughput> {
    sdk::ProvisionedThroughput::builder()
        .read_capacity_units(units.read_capacity.max(1))
        .write_capacity_units(units.write_capacity.max(1))
        .build()
        .map_err(build_error)
}

fn projection(projection: &Projection) -> sdk::Projection {
    let non_key = if projection.non_key_attributes.is_empty() {
        None
    } else {
        Some(projection.non_key_attributes.clone())
    };
    sdk::Projection::builder()
        .set_projection_type(projection.projection_type.as_deref().map(sdk::ProjectionType::from))
        .set_non_key_attributes(non_key)
        .build()
}

fn key_elements(elements: &[sdk::KeySchemaElement]) -> Result<Vec<KeyElement>> {
    elements
        .iter()
        .map(|k| {
            Ok(KeyElement {
                attribute: k.attribute_name().to_string(),
                key_type: k.key_type().as_str().parse::<KeyType>()?,
            })
        })
        .collect()
}

fn projection_from(projection: Option<&sdk::Projection>) -> Projection {
    match projection {
        Some(p) => Projection {
            projection_type: p.projection_type().map(|t| t.as_str().to_string()),
            non_key_attributes: p.non_key_attributes().to_vec(),
        },
        None => Projection::default(),
    }
}

fn throughput_from(description: Option<&sdk::ProvisionedThroughputDescription>) -> Throughput {
    description
        .map(|t| Throughput {
            read_capacity: t.read_capacity_units().unwrap_or(0),
            write_capacity: t.write_capacity_units().unwrap_or(0),
        })
        .unwrap_or_default()
}

fn schema_from_description(description: &sdk::TableDescription) -> Result<TableSchema> {
    let throughput = throughput_from(description.provisioned_throughput());
    let billing_mode = match description.billing_mode_summary().and_then(|b| b.billing_mode()) {
        Some(sdk::BillingMode::PayPerRequest) => BillingMode::PayPerRequest,
        Some(_) => BillingMode::Provisioned,
        None if throughput.is_metered() => BillingMode::Provisioned,
        None => BillingMode::PayPerRequest,
    };

    let attribute_definitions = description
        .attribute_definitions()
        .iter()
        .map(|d| {
            Ok(AttributeDefinition {
                name: d.attribute_name().to_string(),
                attribute_type: d.attribute_type().as_str().parse::<ScalarType>()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let global_indexes = description
        .global_secondary_indexes()
        .iter()
        .map(|index| {
            let units = throughput_from(index.provisioned_throughput());
            Ok(IndexSchema {
                name: index.index_name().unwrap_or_default().to_string(),
                key_schema: key_elements(index.key_schema())?,
                projection: projection_from(index.projection()),
                throughput: units.is_metered().then_some(units),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let local_indexes = description
        .local_secondary_indexes()
        .iter()
        .map(|index| {
            Ok(IndexSchema {
                name: index.index_name().unwrap_or_default().to_string(),
                key_schema: key_elements(index.key_schema())?,
                projection: projection_from(index.projection()),
                throughput: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let stream = description.stream_specification().map(|s| StreamSpec {
        enabled: s.stream_enabled(),
        view_type: s.stream_view_type().map(|v| v.as_str().to_string()),
    });

    Ok(TableSchema {
        name: description.table_name().unwrap_or_default().to_string(),
        status: description
            .table_status()
            .map(|s| TableStatus::parse(s.as_str()))
            .unwrap_or(TableStatus::Other("UNKNOWN".to_string())),
        key_schema: key_elements(description.key_schema())?,
        attribute_definitions,
        billing_mode,
        throughput,
        global_indexes,
        local_indexes,
        stream,
        item_count: description.item_count().unwrap_or(0),
        size_bytes: description.table_size_bytes().unwrap_or(0),
    })
}
