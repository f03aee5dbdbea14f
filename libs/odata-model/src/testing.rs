//! Northwind-style fixture model shared by the test suites of dependent crates.
#![allow(clippy::expect_used, clippy::missing_panics_doc, clippy::too_many_lines)]

use crate::builder::ModelBuilder;
use crate::config::ServiceConfiguration;
use crate::instance::{ComplexInstance, EntityInstance, PropertyValue};
use crate::primitive::EdmPrimitiveType as K;
use crate::provider::{MetadataModel, MetadataProvider};
use crate::rights::EntitySetRights;
use crate::singleton::SingletonMetadata;
use crate::value::{PrimitiveValue, parse_datetime};
use crate::version::ProtocolVersion;
use crate::wrapper::MetadataProviderWrapper;
use indexmap::IndexMap;
use std::sync::Arc;
use uuid::Uuid;

pub const ALFKI_GUID: &str = "05b242e7-52eb-46bd-8f0e-6568b72cd9a5";
pub const ANATR_GUID: &str = "15b242e7-52eb-46bd-8f0e-6568b72cd9a6";
pub const BERGS_GUID: &str = "25b242e7-52eb-46bd-8f0e-6568b72cd9a7";

/// Customers (keys `CustomerID`, `CustomerGuid`) and Orders (key `OrderID`)
/// linked both ways, plus Products, `Order_Details` and Employees.
#[must_use]
pub fn northwind_model() -> MetadataModel {
    let mut b = ModelBuilder::new("NorthWindEntities", "NorthWind");

    let address = b.add_complex_type("Address").expect("Address");
    b.add_primitive_property(address, "StreetName", K::String).expect("StreetName");
    b.add_primitive_property(address, "City", K::String).expect("City");
    b.add_primitive_property(address, "PostalCode", K::String).expect("PostalCode");

    let customer = b.add_entity_type("Customer", None, false).expect("Customer");
    b.add_key_property(customer, "CustomerID", K::String).expect("CustomerID");
    b.add_key_property(customer, "CustomerGuid", K::Guid).expect("CustomerGuid");
    b.add_primitive_property(customer, "CustomerName", K::String).expect("CustomerName");
    b.add_primitive_property(customer, "Country", K::String).expect("Country");
    b.add_primitive_property(customer, "Rating", K::Int32).expect("Rating");
    b.add_primitive_property(customer, "Photo", K::Binary).expect("Photo");
    b.add_complex_property(customer, "Address", address).expect("Address");

    let order = b.add_entity_type("Order", None, false).expect("Order");
    b.add_key_property(order, "OrderID", K::Int32).expect("OrderID");
    b.add_primitive_property(order, "OrderDate", K::DateTime).expect("OrderDate");
    b.add_primitive_property(order, "DeliveryDate", K::DateTime).expect("DeliveryDate");
    b.add_primitive_property(order, "ShipName", K::String).expect("ShipName");
    b.add_primitive_property(order, "ShipAddress", K::String).expect("ShipAddress");
    b.add_primitive_property(order, "Price", K::Decimal).expect("Price");
    b.add_primitive_property(order, "Discount", K::Double).expect("Discount");

    let product = b.add_entity_type("Product", None, false).expect("Product");
    b.add_key_property(product, "ProductID", K::Int32).expect("ProductID");
    b.add_primitive_property(product, "ProductName", K::String).expect("ProductName");
    b.add_primitive_property(product, "UnitPrice", K::Decimal).expect("UnitPrice");
    b.add_primitive_property(product, "Discontinued", K::Boolean).expect("Discontinued");
    b.add_etag_property(product, "RowVersion", K::Int64).expect("RowVersion");

    let detail = b.add_entity_type("Order_Details", None, false).expect("Order_Details");
    b.add_key_property(detail, "ProductID", K::Int32).expect("ProductID");
    b.add_key_property(detail, "OrderID", K::Int32).expect("OrderID");
    b.add_primitive_property(detail, "UnitPrice", K::Decimal).expect("UnitPrice");
    b.add_primitive_property(detail, "Quantity", K::Int16).expect("Quantity");
    b.add_primitive_property(detail, "Discount", K::Single).expect("Discount");

    let employee = b.add_entity_type("Employee", None, false).expect("Employee");
    b.add_key_property(employee, "EmployeeID", K::String).expect("EmployeeID");
    b.add_primitive_property(employee, "FirstName", K::String).expect("FirstName");
    b.add_primitive_property(employee, "LastName", K::String).expect("LastName");
    b.add_bag_property(employee, "Emails", ModelBuilder::primitive(K::String)).expect("Emails");
    b.set_media_link_entry(employee, true).expect("MLE");
    b.add_named_stream(employee, "TumbNail_48X48").expect("stream");

    b.add_resource_set("Customers", customer).expect("Customers");
    b.add_resource_set("Orders", order).expect("Orders");
    b.add_resource_set("Products", product).expect("Products");
    b.add_resource_set("Order_Details", detail).expect("Order_Details");
    b.add_resource_set("Employees", employee).expect("Employees");

    b.add_resource_set_reference_property(customer, "Orders", "Orders").expect("Orders nav");
    b.add_resource_reference_property(order, "Customer", "Customers").expect("Customer nav");
    b.link_navigation_properties((customer, "Orders"), (order, "Customer"))
        .expect("link");
    b.add_resource_set_reference_property(order, "Order_Details", "Order_Details")
        .expect("Order_Details nav");
    b.add_resource_reference_property(detail, "Order", "Orders").expect("Order nav");
    b.link_navigation_properties((order, "Order_Details"), (detail, "Order"))
        .expect("link");
    b.add_resource_reference_property(detail, "Product", "Products").expect("Product nav");
    b.add_resource_reference_property(employee, "Manager", "Employees").expect("Manager nav");

    b.add_singleton(
        SingletonMetadata::new("TopCustomer", customer)
            .expect("TopCustomer")
            .in_entity_set("Customers"),
    )
    .expect("singleton");
    b.add_singleton(
        SingletonMetadata::new("CustomersByCountry", customer)
            .expect("CustomersByCountry")
            .returning_collection()
            .in_entity_set("Customers")
            .with_parameter("country", K::String),
    )
    .expect("singleton");

    b.build().expect("northwind model")
}

#[must_use]
pub fn northwind_provider() -> Arc<dyn MetadataProvider> {
    Arc::new(northwind_model())
}

/// Every set fully accessible, counts and projections on, protocol 3.0.
#[must_use]
pub fn northwind_config() -> ServiceConfiguration {
    let mut config = ServiceConfiguration {
        max_protocol_version: ProtocolVersion::V3,
        accept_count_requests: true,
        accept_projection_requests: true,
        ..ServiceConfiguration::default()
    };
    config.set_entity_set_access_rule("*", EntitySetRights::ALL);
    config
}

#[must_use]
pub fn northwind_wrapper(config: ServiceConfiguration) -> MetadataProviderWrapper {
    MetadataProviderWrapper::new(northwind_provider(), Arc::new(config))
}

fn guid(text: &str) -> PrimitiveValue {
    PrimitiveValue::Guid(Uuid::parse_str(text).expect("fixture guid"))
}

fn date(text: &str) -> PrimitiveValue {
    PrimitiveValue::DateTime(parse_datetime(text).expect("fixture date"))
}

fn decimal(text: &str) -> PrimitiveValue {
    PrimitiveValue::Decimal(text.parse().expect("fixture decimal"))
}

/// Sample rows for each fixture set, keyed by set name.
#[must_use]
pub fn northwind_entities(model: &MetadataModel) -> IndexMap<String, Vec<EntityInstance>> {
    let id = |name: &str| {
        model
            .resolve_resource_type(name)
            .expect("fixture type")
            .id()
    };
    let (customer, order, product, detail, employee, address) = (
        id("Customer"),
        id("Order"),
        id("Product"),
        id("Order_Details"),
        id("Employee"),
        id("Address"),
    );

    let customer_row = |cid: &str, g: &str, name: &str, country: &str, rating: i32, city: &str| {
        EntityInstance::new(customer)
            .with("CustomerID", cid)
            .with("CustomerGuid", guid(g))
            .with("CustomerName", name)
            .with("Country", country)
            .with("Rating", rating)
            .with("Photo", PrimitiveValue::Null)
            .with(
                "Address",
                PropertyValue::Complex(Some(
                    ComplexInstance::new(address)
                        .with("StreetName", "Obere Str. 57")
                        .with("City", city)
                        .with("PostalCode", "12209"),
                )),
            )
    };
    let customers = vec![
        customer_row("ALFKI", ALFKI_GUID, "Alfreds Futterkiste", "Germany", 4, "Berlin"),
        customer_row("ANATR", ANATR_GUID, "Ana Trujillo Emparedados", "Mexico", 3, "Mexico D.F."),
        customer_row("BERGS", BERGS_GUID, "Berglunds snabbkop", "Sweden", 5, "Lulea"),
    ];

    let order_row = |oid: i32, ship: &str, price: &str| {
        EntityInstance::new(order)
            .with("OrderID", oid)
            .with("OrderDate", date("2011-03-04T10:20:30"))
            .with("DeliveryDate", PrimitiveValue::Null)
            .with("ShipName", ship)
            .with("ShipAddress", "Obere Str. 57")
            .with("Price", decimal(price))
            .with("Discount", 0.1)
    };
    let orders = vec![
        order_row(10643, "Alfreds Futterkiste", "814.50"),
        order_row(10692, "Alfreds Futterkiste", "878.00"),
        order_row(10759, "Ana Trujillo", "320.00"),
        order_row(10278, "Berglunds snabbkop", "1488.80"),
    ];

    let products = vec![
        EntityInstance::new(product)
            .with("ProductID", 1)
            .with("ProductName", "Chai")
            .with("UnitPrice", decimal("18.00"))
            .with("Discontinued", false)
            .with("RowVersion", 7_i64),
        EntityInstance::new(product)
            .with("ProductID", 2)
            .with("ProductName", "Chang")
            .with("UnitPrice", decimal("19.00"))
            .with("Discontinued", true)
            .with("RowVersion", 3_i64),
    ];

    let detail_row = |oid: i32, pid: i32, qty: i16| {
        EntityInstance::new(detail)
            .with("ProductID", pid)
            .with("OrderID", oid)
            .with("UnitPrice", decimal("18.00"))
            .with("Quantity", qty)
            .with("Discount", PrimitiveValue::Single(0.0))
    };
    let details = vec![detail_row(10643, 1, 15), detail_row(10643, 2, 21), detail_row(10692, 1, 20)];

    let employees = vec![
        EntityInstance::new(employee)
            .with("EmployeeID", "EMP1")
            .with("FirstName", "Nancy")
            .with("LastName", "Davolio")
            .with(
                "Emails",
                PropertyValue::Bag(vec!["nancy@example.com".into(), "nd@example.com".into()]),
            ),
        EntityInstance::new(employee)
            .with("EmployeeID", "EMP2")
            .with("FirstName", "Andrew")
            .with("LastName", "Fuller")
            .with("Emails", PropertyValue::Bag(Vec::new())),
    ];

    IndexMap::from([
        ("Customers".to_owned(), customers),
        ("Orders".to_owned(), orders),
        ("Products".to_owned(), products),
        ("Order_Details".to_owned(), details),
        ("Employees".to_owned(), employees),
    ])
}

/// One relationship row between two fixture entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureLink {
    pub source_set: &'static str,
    /// Key predicate body, as it would appear between the parentheses.
    pub source_key: &'static str,
    pub property: &'static str,
    pub target_set: &'static str,
    pub target_key: &'static str,
}

const ALFKI: &str = "CustomerID='ALFKI',CustomerGuid=guid'05b242e7-52eb-46bd-8f0e-6568b72cd9a5'";
const ANATR: &str = "CustomerID='ANATR',CustomerGuid=guid'15b242e7-52eb-46bd-8f0e-6568b72cd9a6'";
const BERGS: &str = "CustomerID='BERGS',CustomerGuid=guid'25b242e7-52eb-46bd-8f0e-6568b72cd9a7'";

/// Which order belongs to which customer, and so on.
#[must_use]
pub fn northwind_links() -> Vec<FixtureLink> {
    let link = |source_set, source_key, property, target_set, target_key| FixtureLink {
        source_set,
        source_key,
        property,
        target_set,
        target_key,
    };
    vec![
        link("Customers", ALFKI, "Orders", "Orders", "10643"),
        link("Customers", ALFKI, "Orders", "Orders", "10692"),
        link("Customers", ANATR, "Orders", "Orders", "10759"),
        link("Customers", BERGS, "Orders", "Orders", "10278"),
        link("Orders", "10643", "Order_Details", "Order_Details", "ProductID=1,OrderID=10643"),
        link("Orders", "10643", "Order_Details", "Order_Details", "ProductID=2,OrderID=10643"),
        link("Orders", "10692", "Order_Details", "Order_Details", "ProductID=1,OrderID=10692"),
        link("Order_Details", "ProductID=1,OrderID=10643", "Product", "Products", "1"),
        link("Order_Details", "ProductID=2,OrderID=10643", "Product", "Products", "2"),
        link("Order_Details", "ProductID=1,OrderID=10692", "Product", "Products", "1"),
        link("Employees", "'EMP1'", "Manager", "Employees", "'EMP2'"),
    ]
}
