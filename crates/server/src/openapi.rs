//! Static OpenAPI documents and the interactive docs landing page.

pub fn document() -> serde_json::Value {
    serde_json::json!({
        "openapi": "3.0.3",
        "info": {
            "title": "mikroscope",
            "description": "Log sidecar: durable NDJSON ingest, queryable index, retention maintenance, and webhook alerting.",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": {
            "/health": {
                "get": {
                    "summary": "Composite health report",
                    "responses": { "200": { "description": "Operational snapshot of every subsystem" } }
                }
            },
            "/api/ingest": {
                "post": {
                    "summary": "Push a batch of NDJSON records",
                    "description": "Accepts a JSON array of objects or an object with a `logs` array. The producer identity comes from basic credentials or a bearer token mapping; the payload cannot forge producerId.",
                    "security": [{ "bearerAuth": [] }, { "basicAuth": [] }],
                    "responses": {
                        "200": { "description": "Batch written and indexed synchronously" },
                        "202": { "description": "Batch queued for a coalesced flush" },
                        "400": { "description": "Malformed payload" },
                        "401": { "description": "Invalid producer credentials" },
                        "404": { "description": "Ingest not configured" },
                        "413": { "description": "Body exceeds maxBodyBytes" }
                    }
                }
            },
            "/api/logs": {
                "get": {
                    "summary": "Paginated entry query",
                    "parameters": [
                        { "name": "from", "in": "query", "schema": { "type": "string" } },
                        { "name": "to", "in": "query", "schema": { "type": "string" } },
                        { "name": "level", "in": "query", "schema": { "type": "string" } },
                        { "name": "audit", "in": "query", "schema": { "type": "string", "enum": ["true", "false", "1", "0"] } },
                        { "name": "field", "in": "query", "schema": { "type": "string" } },
                        { "name": "value", "in": "query", "schema": { "type": "string" } },
                        { "name": "limit", "in": "query", "schema": { "type": "integer", "maximum": 1000 } },
                        { "name": "cursor", "in": "query", "schema": { "type": "string" } }
                    ],
                    "responses": {
                        "200": { "description": "Page of entries ordered by (timestamp DESC, id DESC)" },
                        "400": { "description": "Invalid query parameter" }
                    }
                }
            },
            "/api/logs/aggregate": {
                "get": {
                    "summary": "Grouped aggregation",
                    "parameters": [
                        { "name": "groupBy", "in": "query", "required": true,
                          "schema": { "type": "string", "enum": ["level", "event", "field", "correlation"] } },
                        { "name": "groupField", "in": "query", "schema": { "type": "string" } }
                    ],
                    "responses": {
                        "200": { "description": "Buckets ordered by count DESC, key ASC" },
                        "400": { "description": "Unknown groupBy or missing groupField" }
                    }
                }
            },
            "/api/logs/stats": {
                "get": {
                    "summary": "Index statistics",
                    "responses": { "200": { "description": "Entry/field counts and approximate database size" } }
                }
            },
            "/api/reindex": {
                "post": {
                    "summary": "Reset the index and rebuild from the raw files",
                    "responses": { "200": { "description": "Full pass report plus reset counts" } }
                }
            },
            "/api/alerts/config": {
                "get": { "summary": "Current alert policy", "responses": { "200": { "description": "Raw policy and its config path" } } },
                "put": {
                    "summary": "Patch the alert policy",
                    "responses": {
                        "200": { "description": "Merged, validated, persisted policy" },
                        "400": { "description": "Unknown field or bound violation" }
                    }
                }
            },
            "/api/alerts/test-webhook": {
                "post": {
                    "summary": "Send a manual test delivery",
                    "responses": {
                        "200": { "description": "Delivery succeeded" },
                        "400": { "description": "No target URL or delivery failed" }
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "bearerAuth": { "type": "http", "scheme": "bearer" },
                "basicAuth": { "type": "http", "scheme": "basic" }
            },
            "schemas": {
                "LogEntry": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer" },
                        "timestamp": { "type": "string", "description": "Canonical RFC 3339 UTC" },
                        "level": { "type": "string" },
                        "event": { "type": "string" },
                        "message": { "type": "string" },
                        "isAudit": { "type": "boolean" },
                        "data": { "type": "object", "description": "The original record" },
                        "sourceFile": { "type": "string" },
                        "lineNumber": { "type": "integer" }
                    }
                },
                "LogsPage": {
                    "type": "object",
                    "properties": {
                        "entries": { "type": "array", "items": { "$ref": "#/components/schemas/LogEntry" } },
                        "hasMore": { "type": "boolean" },
                        "limit": { "type": "integer" },
                        "nextCursor": { "type": "string" }
                    }
                },
                "AggregateResult": {
                    "type": "object",
                    "properties": {
                        "buckets": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "key": { "type": "string" },
                                    "count": { "type": "integer" }
                                }
                            }
                        },
                        "groupBy": { "type": "string" },
                        "groupField": { "type": "string" }
                    }
                },
                "IngestResponse": {
                    "type": "object",
                    "properties": {
                        "accepted": { "type": "integer" },
                        "rejected": { "type": "integer" },
                        "queued": { "type": "boolean" },
                        "producerId": { "type": "string" },
                        "receivedAt": { "type": "string" }
                    }
                },
                "AlertPolicy": {
                    "type": "object",
                    "properties": {
                        "enabled": { "type": "boolean" },
                        "webhookUrl": { "type": "string", "nullable": true },
                        "intervalMs": { "type": "integer", "minimum": 1000 },
                        "windowMinutes": { "type": "integer", "minimum": 1 },
                        "errorThreshold": { "type": "integer", "minimum": 1 },
                        "noLogsThresholdMinutes": { "type": "integer", "minimum": 0 },
                        "cooldownMs": { "type": "integer", "minimum": 1000 },
                        "webhookTimeoutMs": { "type": "integer", "minimum": 250 },
                        "webhookRetryAttempts": { "type": "integer", "minimum": 1 },
                        "webhookBackoffMs": { "type": "integer", "minimum": 25 }
                    }
                },
                "Error": {
                    "type": "object",
                    "properties": { "error": { "type": "string" } }
                }
            }
        }
    })
}

pub const DOCUMENT_YAML: &str = r#"openapi: 3.0.3
info:
  title: mikroscope
  description: >-
    Log sidecar: durable NDJSON ingest, queryable index, retention
    maintenance, and webhook alerting.
paths:
  /health:
    get:
      summary: Composite health report
  /api/ingest:
    post:
      summary: Push a batch of NDJSON records
  /api/logs:
    get:
      summary: Paginated entry query
  /api/logs/aggregate:
    get:
      summary: Grouped aggregation
  /api/logs/stats:
    get:
      summary: Index statistics
  /api/reindex:
    post:
      summary: Reset the index and rebuild from the raw files
  /api/alerts/config:
    get:
      summary: Current alert policy
    put:
      summary: Patch the alert policy
  /api/alerts/test-webhook:
    post:
      summary: Send a manual test delivery
components:
  securitySchemes:
    bearerAuth:
      type: http
      scheme: bearer
    basicAuth:
      type: http
      scheme: basic
"#;

pub const DOCS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>mikroscope API</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 760px; margin: 50px auto; padding: 20px; }
        h1 { color: #1a1a2e; }
        .endpoint { background: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; }
        .method { font-weight: bold; color: #16213e; }
        code { background: #e8e8e8; padding: 2px 6px; border-radius: 3px; }
    </style>
</head>
<body>
    <h1>mikroscope</h1>
    <p>Log sidecar: durable NDJSON ingest, queryable index, retention maintenance, and webhook alerting.</p>
    <p>Machine-readable documents: <a href="/openapi.json">openapi.json</a> &middot; <a href="/openapi.yaml">openapi.yaml</a></p>

    <h2>Endpoints</h2>
    <div class="endpoint"><span class="method">GET</span> <code>/health</code> - composite health report</div>
    <div class="endpoint"><span class="method">POST</span> <code>/api/ingest</code> - push NDJSON records (producer auth)</div>
    <div class="endpoint"><span class="method">GET</span> <code>/api/logs</code> - paginated filter query</div>
    <div class="endpoint"><span class="method">GET</span> <code>/api/logs/aggregate</code> - grouped counts</div>
    <div class="endpoint"><span class="method">GET</span> <code>/api/logs/stats</code> - index statistics</div>
    <div class="endpoint"><span class="method">POST</span> <code>/api/reindex</code> - reset and rebuild the index</div>
    <div class="endpoint"><span class="method">GET</span> <code>/api/alerts/config</code> - alert policy</div>
    <div class="endpoint"><span class="method">PUT</span> <code>/api/alerts/config</code> - update alert policy</div>
    <div class="endpoint"><span class="method">POST</span> <code>/api/alerts/test-webhook</code> - manual webhook test</div>
</body>
</html>"#;
