use shared::metrics_defs::{MetricDef, MetricType};

pub const GQL_DISPATCH: MetricDef = MetricDef {
    name: "gql.dispatch",
    metric_type: MetricType::Counter,
    description: "Classified search queries. Tagged with operation and handler (fan_out, local).",
};

pub const FANOUT_DURATION: MetricDef = MetricDef {
    name: "gql.fanout.duration",
    metric_type: MetricType::Histogram,
    description: "Duration in seconds of a fan-out across all members, including the merge",
};

pub const ALL_METRICS: &[MetricDef] = &[GQL_DISPATCH, FANOUT_DURATION];
