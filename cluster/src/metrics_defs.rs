use shared::metrics_defs::{MetricDef, MetricType};

pub const CLUSTER_REQUESTS: MetricDef = MetricDef {
    name: "cluster.requests",
    metric_type: MetricType::Counter,
    description: "Repository requests seen by the routing middleware. Tagged with decision (local, remote).",
};

pub const FORWARD_ERRORS: MetricDef = MetricDef {
    name: "cluster.forward.errors",
    metric_type: MetricType::Counter,
    description: "Forwarded requests that failed to reach the owning member",
};

pub const FORWARD_DURATION: MetricDef = MetricDef {
    name: "cluster.forward.duration",
    metric_type: MetricType::Histogram,
    description: "Duration in seconds of a forwarded exchange, including buffering the response body",
};

pub const ALL_METRICS: &[MetricDef] = &[CLUSTER_REQUESTS, FORWARD_ERRORS, FORWARD_DURATION];
