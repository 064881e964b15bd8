//! Rendering of [`ProxyGraph`] fragments into Envoy v3 protobuf resources.
//!
//! Every cluster is EDS-backed over ADS, so static hosts and discovered
//! endpoints reach Envoy the same way. HTTP connection managers fetch their
//! route table over RDS on the same stream.

use crate::translation::{
    ClusterFragment, EndpointSet, ListenerFragment, ProxyGraph, RouteFragment, RouteFragmentAction,
    RouteTableFragment, SniCertificate, TlsMaterial,
};
use crate::domain::Matcher;
use envoy_types::pb::envoy::config::cluster::v3::cluster::{
    ClusterDiscoveryType, DiscoveryType, EdsClusterConfig,
};
use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::{
    address::Address as AddressType, config_source::ConfigSourceSpecifier, data_source::Specifier,
    socket_address::{PortSpecifier, Protocol},
    transport_socket::ConfigType as TransportSocketConfigType, Address, AggregatedConfigSource,
    ApiVersion, ConfigSource, DataSource, SocketAddress, TransportSocket,
};
use envoy_types::pb::envoy::config::endpoint::v3::{
    lb_endpoint, ClusterLoadAssignment, Endpoint as EnvoyEndpoint, LbEndpoint, LocalityLbEndpoints,
};
use envoy_types::pb::envoy::config::listener::v3::{
    filter, listener_filter, Filter, FilterChain, FilterChainMatch, Listener, ListenerFilter,
};
use envoy_types::pb::envoy::config::route::v3::{
    redirect_action::{PathRewriteSpecifier, RedirectResponseCode},
    route, route_action::ClusterSpecifier, route_match::PathSpecifier, weighted_cluster,
    DirectResponseAction, RedirectAction, Route, RouteAction, RouteConfiguration, RouteMatch,
    VirtualHost, WeightedCluster,
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter, Rds,
};
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{
    common_tls_context::ValidationContextType, CertificateValidationContext, CommonTlsContext,
    DownstreamTlsContext, TlsCertificate, UpstreamTlsContext,
};
use envoy_types::pb::envoy::r#type::matcher::v3::RegexMatcher;
use envoy_types::pb::google::protobuf::{Any, Duration, UInt32Value};
use prost::Message;

pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";

const HCM_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";
const ROUTER_TYPE_URL: &str = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const DOWNSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.DownstreamTlsContext";
const UPSTREAM_TLS_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext";
const TLS_INSPECTOR_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector";

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    fn encode<M: Message>(name: &str, type_url: &str, message: &M) -> Self {
        Self {
            name: name.to_string(),
            resource: Any { type_url: type_url.to_string(), value: message.encode_to_vec() },
        }
    }

    pub fn into_any(self) -> Any {
        self.resource
    }
}

/// Resources of `type_url` for a consumer. Endpoint sets the graph lacks are
/// looked up in `discovered`; clusters with neither get an empty assignment.
/// Unknown type URLs yield nothing.
pub fn build_resources(
    type_url: &str,
    graph: &ProxyGraph,
    discovered: Option<&ProxyGraph>,
) -> Vec<BuiltResource> {
    match type_url {
        LISTENER_TYPE_URL => graph.listeners.values().map(build_listener).collect(),
        ROUTE_TYPE_URL => graph.route_tables.values().map(build_route_configuration).collect(),
        CLUSTER_TYPE_URL => graph.clusters.values().map(build_cluster).collect(),
        ENDPOINT_TYPE_URL => graph
            .clusters
            .keys()
            .map(|cluster| {
                let set = graph
                    .endpoints
                    .get(cluster)
                    .or_else(|| discovered.and_then(|d| d.endpoints.get(cluster)));
                build_load_assignment(cluster, set)
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn build_listener(fragment: &ListenerFragment) -> BuiltResource {
    let hcm = Filter {
        name: "envoy.filters.network.http_connection_manager".to_string(),
        config_type: Some(filter::ConfigType::TypedConfig(Any {
            type_url: HCM_TYPE_URL.to_string(),
            value: http_connection_manager(fragment).encode_to_vec(),
        })),
    };

    let (filter_chains, listener_filters) = if fragment.tls.is_empty() {
        (vec![FilterChain { filters: vec![hcm], ..Default::default() }], Vec::new())
    } else {
        let chains = fragment
            .tls
            .iter()
            .map(|sni| FilterChain {
                filter_chain_match: Some(FilterChainMatch {
                    server_names: sni.server_names.clone(),
                    ..Default::default()
                }),
                filters: vec![hcm.clone()],
                transport_socket: Some(downstream_tls(sni)),
                ..Default::default()
            })
            .collect();
        let inspector = ListenerFilter {
            name: "envoy.filters.listener.tls_inspector".to_string(),
            config_type: Some(listener_filter::ConfigType::TypedConfig(Any {
                type_url: TLS_INSPECTOR_TYPE_URL.to_string(),
                value: Vec::new(),
            })),
            ..Default::default()
        };
        (chains, vec![inspector])
    };

    let listener = Listener {
        name: fragment.name.clone(),
        address: Some(socket_address(&fragment.address, fragment.port)),
        filter_chains,
        listener_filters,
        ..Default::default()
    };

    BuiltResource::encode(&fragment.name, LISTENER_TYPE_URL, &listener)
}

fn http_connection_manager(fragment: &ListenerFragment) -> HttpConnectionManager {
    HttpConnectionManager {
        codec_type: CodecType::Auto as i32,
        stat_prefix: fragment.name.clone(),
        route_specifier: Some(RouteSpecifier::Rds(Rds {
            route_config_name: fragment.route_table.clone(),
            config_source: Some(ads_config_source()),
        })),
        http_filters: vec![HttpFilter {
            name: "envoy.filters.http.router".to_string(),
            config_type: Some(HttpFilterConfigType::TypedConfig(Any {
                type_url: ROUTER_TYPE_URL.to_string(),
                value: Router::default().encode_to_vec(),
            })),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn ads_config_source() -> ConfigSource {
    ConfigSource {
        config_source_specifier: Some(ConfigSourceSpecifier::Ads(AggregatedConfigSource::default())),
        resource_api_version: ApiVersion::V3 as i32,
        ..Default::default()
    }
}

fn socket_address(address: &str, port: u16) -> Address {
    Address {
        address: Some(AddressType::SocketAddress(SocketAddress {
            protocol: Protocol::Tcp as i32,
            address: address.to_string(),
            port_specifier: Some(PortSpecifier::PortValue(u32::from(port))),
            ipv4_compat: address == "::",
            ..Default::default()
        })),
    }
}

fn inline(value: &str) -> DataSource {
    DataSource { specifier: Some(Specifier::InlineString(value.to_string())), ..Default::default() }
}

fn common_tls_context(material: &TlsMaterial) -> CommonTlsContext {
    let tls_certificates = if material.cert_chain.is_empty() {
        Vec::new()
    } else {
        vec![TlsCertificate {
            certificate_chain: Some(inline(&material.cert_chain)),
            private_key: Some(inline(&material.private_key)),
            ..Default::default()
        }]
    };

    CommonTlsContext {
        tls_certificates,
        validation_context_type: material.root_ca.as_deref().map(|ca| {
            ValidationContextType::ValidationContext(CertificateValidationContext {
                trusted_ca: Some(inline(ca)),
                ..Default::default()
            })
        }),
        ..Default::default()
    }
}

fn downstream_tls(sni: &SniCertificate) -> TransportSocket {
    let context = DownstreamTlsContext {
        common_tls_context: Some(common_tls_context(&sni.material)),
        ..Default::default()
    };
    TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(Any {
            type_url: DOWNSTREAM_TLS_TYPE_URL.to_string(),
            value: context.encode_to_vec(),
        })),
    }
}

fn upstream_tls(material: &TlsMaterial) -> TransportSocket {
    let context = UpstreamTlsContext {
        common_tls_context: Some(common_tls_context(material)),
        ..Default::default()
    };
    TransportSocket {
        name: "envoy.transport_sockets.tls".to_string(),
        config_type: Some(TransportSocketConfigType::TypedConfig(Any {
            type_url: UPSTREAM_TLS_TYPE_URL.to_string(),
            value: context.encode_to_vec(),
        })),
    }
}

pub fn build_route_configuration(fragment: &RouteTableFragment) -> BuiltResource {
    let config = RouteConfiguration {
        name: fragment.name.clone(),
        virtual_hosts: fragment
            .virtual_hosts
            .iter()
            .map(|host| VirtualHost {
                name: host.name.clone(),
                domains: host.domains.clone(),
                routes: host.routes.iter().map(build_route).collect(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    BuiltResource::encode(&fragment.name, ROUTE_TYPE_URL, &config)
}

fn build_route(fragment: &RouteFragment) -> Route {
    let path_specifier = match &fragment.matcher {
        Matcher::Prefix(prefix) => PathSpecifier::Prefix(prefix.clone()),
        Matcher::Exact(path) => PathSpecifier::Path(path.clone()),
        Matcher::Regex(regex) => {
            PathSpecifier::SafeRegex(RegexMatcher { regex: regex.clone(), ..Default::default() })
        }
    };

    Route {
        name: fragment.name.clone(),
        r#match: Some(RouteMatch { path_specifier: Some(path_specifier), ..Default::default() }),
        action: Some(route_action(&fragment.action)),
        ..Default::default()
    }
}

fn route_action(action: &RouteFragmentAction) -> route::Action {
    match action {
        RouteFragmentAction::Cluster(cluster) => {
            #[allow(deprecated)]
            let action = RouteAction {
                cluster_specifier: Some(ClusterSpecifier::Cluster(cluster.clone())),
                ..Default::default()
            };
            route::Action::Route(action)
        }
        RouteFragmentAction::WeightedClusters(weights) => {
            let clusters = weights
                .iter()
                .map(|w| weighted_cluster::ClusterWeight {
                    name: w.cluster.clone(),
                    weight: Some(UInt32Value { value: w.weight }),
                    ..Default::default()
                })
                .collect();
            #[allow(deprecated)]
            let action = RouteAction {
                cluster_specifier: Some(ClusterSpecifier::WeightedClusters(WeightedCluster {
                    clusters,
                    ..Default::default()
                })),
                ..Default::default()
            };
            route::Action::Route(action)
        }
        RouteFragmentAction::DirectResponse { status, body } => {
            route::Action::DirectResponse(DirectResponseAction {
                status: u32::from(*status),
                body: Some(inline(body)),
                ..Default::default()
            })
        }
        RouteFragmentAction::Redirect { host, path, code } => {
            let response_code = match code {
                302 => RedirectResponseCode::Found,
                303 => RedirectResponseCode::SeeOther,
                307 => RedirectResponseCode::TemporaryRedirect,
                308 => RedirectResponseCode::PermanentRedirect,
                _ => RedirectResponseCode::MovedPermanently,
            };
            route::Action::Redirect(RedirectAction {
                host_redirect: host.clone().unwrap_or_default(),
                path_rewrite_specifier: path.clone().map(PathRewriteSpecifier::PathRedirect),
                response_code: response_code as i32,
                ..Default::default()
            })
        }
    }
}

pub fn build_cluster(fragment: &ClusterFragment) -> BuiltResource {
    let timeout = fragment.connect_timeout_ms;
    let cluster = Cluster {
        name: fragment.name.clone(),
        connect_timeout: Some(Duration {
            seconds: (timeout / 1000) as i64,
            nanos: ((timeout % 1000) * 1_000_000) as i32,
        }),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Eds as i32)),
        eds_cluster_config: Some(EdsClusterConfig {
            eds_config: Some(ads_config_source()),
            ..Default::default()
        }),
        transport_socket: fragment.tls.as_ref().map(upstream_tls),
        ..Default::default()
    };

    BuiltResource::encode(&fragment.name, CLUSTER_TYPE_URL, &cluster)
}

pub fn build_load_assignment(cluster: &str, set: Option<&EndpointSet>) -> BuiltResource {
    let lb_endpoints: Vec<LbEndpoint> = set
        .map(|set| set.endpoints.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|endpoint| LbEndpoint {
            host_identifier: Some(lb_endpoint::HostIdentifier::Endpoint(EnvoyEndpoint {
                address: Some(socket_address(&endpoint.address, endpoint.port)),
                ..Default::default()
            })),
            load_balancing_weight: Some(UInt32Value { value: endpoint.weight.max(1) }),
            ..Default::default()
        })
        .collect();

    let endpoints = if lb_endpoints.is_empty() {
        Vec::new()
    } else {
        vec![LocalityLbEndpoints { lb_endpoints, ..Default::default() }]
    };

    let assignment =
        ClusterLoadAssignment { cluster_name: cluster.to_string(), endpoints, ..Default::default() };

    BuiltResource::encode(cluster, ENDPOINT_TYPE_URL, &assignment)
}
